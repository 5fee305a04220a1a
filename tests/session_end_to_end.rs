use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use lens_seek::{
    FrameLeases, LensFacing, NormalizedRect, PixelFormat, RawFrame, ScriptedDetection,
    SeekConfig, Session, StubBackend,
};

const LABELS: &str = "???\nperson\nbicycle\nCup\ndog\n";
const CUP: usize = 2;
const DOG: usize = 3;
const TIMEOUT: Duration = Duration::from_secs(5);

fn labels_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp labels");
    file.write_all(LABELS.as_bytes()).expect("write labels");
    file
}

fn config(labels: &NamedTempFile, target: &str) -> SeekConfig {
    let mut cfg = SeekConfig::for_target(target);
    cfg.labels_path = labels.path().to_path_buf();
    cfg
}

fn scripted(class: usize, score: f32) -> Vec<ScriptedDetection> {
    vec![ScriptedDetection {
        class,
        score,
        location: NormalizedRect::new(0.25, 0.3, 0.55, 0.7),
    }]
}

/// 8x6 NV21 frame, rotated 90 degrees like a portrait phone sensor.
fn frame(leases: &FrameLeases, sequence: u64) -> RawFrame {
    let mut data = vec![200u8; 8 * 6];
    data.extend(std::iter::repeat(128u8).take(2 * 4 * 3));
    leases.lease(RawFrame::new(data, 8, 6, 90, PixelFormat::Nv21).with_sequence(sequence))
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    done()
}

fn wait_for_calls(calls: &Arc<AtomicU64>, n: u64) {
    assert!(
        wait_until(|| calls.load(Ordering::SeqCst) >= n),
        "worker never reached {} inferences",
        n
    );
}

#[test]
fn finds_the_cup_and_stops_analysing() {
    let labels = labels_file();
    let backend = StubBackend::new(4, 4)
        .with_frame(scripted(CUP, 0.3))
        .with_frame(scripted(CUP, 0.6))
        .with_frame(scripted(DOG, 0.9));
    let calls = backend.calls();
    let (session, mut subscription) =
        Session::with_backend(&config(&labels, "cup"), Box::new(backend)).expect("session");
    let leases = FrameLeases::new();

    assert!(session.deliver(frame(&leases, 1)));
    wait_for_calls(&calls, 1);
    assert!(!session.is_latched());

    assert!(session.deliver(frame(&leases, 2)));
    let snapshot = subscription
        .wait_for_snapshot(TIMEOUT)
        .expect("snapshot for the accepted cup");
    assert_eq!(snapshot.sequence, 2);
    // Rotated upright: the 8x6 sensor frame becomes 6x8.
    assert_eq!((snapshot.width, snapshot.height), (6, 8));
    let decoded = image::load_from_memory(&snapshot.png).expect("valid png");
    assert_eq!((decoded.width(), decoded.height()), (6, 8));

    let overlay = subscription
        .state()
        .overlay
        .clone()
        .expect("overlay for the accepted cup");
    assert_eq!(overlay.caption, "0.60 cup");
    assert_eq!(overlay.detection.label, "cup");
    assert!(session.is_latched());

    // Latched: the third frame is released unanalysed.
    assert!(session.deliver(frame(&leases, 3)));
    assert!(wait_until(|| leases.released() == 3));
    let stats = session.shutdown().expect("shutdown");

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(stats.detector_invocations, 2);
    assert_eq!(stats.frames_processed, 2);
    assert_eq!(stats.frames_skipped, 1);
    assert_eq!(leases.outstanding(), 0);
}

#[test]
fn reset_resumes_analysis() {
    let labels = labels_file();
    let backend = StubBackend::new(4, 4)
        .with_frame(scripted(CUP, 0.95))
        .with_frame(scripted(CUP, 0.2));
    let calls = backend.calls();
    let (session, mut subscription) =
        Session::with_backend(&config(&labels, "Cup"), Box::new(backend)).expect("session");
    let leases = FrameLeases::new();

    session.deliver(frame(&leases, 1));
    assert!(subscription.wait_for_snapshot(TIMEOUT).is_some());
    assert!(session.is_latched());

    session.reset();
    session.deliver(frame(&leases, 2));
    wait_for_calls(&calls, 2);
    assert!(wait_until(|| !session.is_latched()));
    assert!(wait_until(|| subscription.poll().overlay.is_none()));

    session.shutdown().expect("shutdown");
    assert_eq!(leases.outstanding(), 0);
}

#[test]
fn malformed_frame_is_skipped_and_pipeline_continues() {
    let labels = labels_file();
    let backend = StubBackend::new(4, 4).with_frame(scripted(CUP, 0.8));
    let calls = backend.calls();
    let (session, mut subscription) =
        Session::with_backend(&config(&labels, "cup"), Box::new(backend)).expect("session");
    let leases = FrameLeases::new();

    let short = leases.lease(RawFrame::new(vec![0u8; 10], 8, 6, 90, PixelFormat::Nv21));
    session.deliver(short);
    assert!(wait_until(|| leases.released() == 1));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!session.is_latched());

    session.deliver(frame(&leases, 2));
    assert!(subscription.wait_for_snapshot(TIMEOUT).is_some());

    let stats = session.shutdown().expect("shutdown");
    assert_eq!(stats.frames_failed, 1);
    assert_eq!(stats.frames_processed, 1);
}

#[test]
fn below_threshold_and_wrong_label_never_latch() {
    let labels = labels_file();
    let backend = StubBackend::new(4, 4)
        .with_frame(scripted(CUP, 0.49))
        .with_frame(scripted(DOG, 0.99));
    let calls = backend.calls();
    let (session, mut subscription) =
        Session::with_backend(&config(&labels, "cup"), Box::new(backend)).expect("session");
    let leases = FrameLeases::new();

    session.deliver(frame(&leases, 1));
    wait_for_calls(&calls, 1);
    session.deliver(frame(&leases, 2));
    wait_for_calls(&calls, 2);

    let stats = session.shutdown().expect("shutdown");
    assert_eq!(stats.frames_processed, 2);
    assert!(subscription.poll().overlay.is_none());
    assert!(subscription.poll().snapshot.is_none());
}

#[test]
fn front_lens_snapshot_is_mirrored_and_overlay_flipped() {
    let labels = labels_file();
    let backend = StubBackend::new(4, 4).with_frame(vec![ScriptedDetection {
        class: CUP,
        score: 0.9,
        location: NormalizedRect::new(0.0, 0.4, 0.2, 0.6),
    }]);
    let mut cfg = config(&labels, "cup");
    cfg.lens_facing = LensFacing::Front;
    let (session, mut subscription) =
        Session::with_backend(&cfg, Box::new(backend)).expect("session");
    let leases = FrameLeases::new();

    session.deliver(frame(&leases, 1));
    assert!(subscription.wait_for_snapshot(TIMEOUT).is_some());
    let overlay = subscription.state().overlay.clone().expect("overlay");
    assert!(overlay.rect.left > cfg.display.view.width / 2.0);

    session.shutdown().expect("shutdown");
}

#[test]
fn missing_labels_file_fails_before_any_frame() {
    let mut cfg = SeekConfig::for_target("cup");
    cfg.labels_path = "/nonexistent/labels.txt".into();
    let err = Session::with_backend(&cfg, Box::new(StubBackend::new(4, 4)))
        .err()
        .expect("label load failure");
    let err = err
        .downcast::<lens_seek::PipelineError>()
        .expect("pipeline error");
    assert!(err.is_fatal());
}
