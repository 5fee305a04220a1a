//! demo - end-to-end synthetic run of the search pipeline
//!
//! Drives a session with synthetic camera frames and a scripted stub detector:
//! a weak match, a confident match, then a confident match of another label.
//! The session latches on the second frame and skips everything after it.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::time::Duration;

use lens_seek::{
    CameraSource, LabelMap, LensFacing, NormalizedRect, PipelineStats, PixelRect,
    ScriptedDetection, SeekConfig, Session, SourceConfig, StubBackend,
};

const DEMO_LABELS: [&str; 5] = ["???", "person", "bicycle", "cup", "dog"];
const CUP: usize = 2;
const DOG: usize = 3;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Label to search for.
    #[arg(long, default_value = "cup")]
    target: String,
    /// Number of synthetic frames to deliver.
    #[arg(long, default_value_t = 8)]
    frames: u32,
    /// Frames per second for the synthetic source.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Simulate the front-facing lens (mirrored overlay and snapshot).
    #[arg(long)]
    front: bool,
    /// Model input edge in pixels.
    #[arg(long, default_value_t = 300)]
    input_size: usize,
}

#[derive(Serialize)]
struct DemoSummary {
    target: String,
    matched: bool,
    caption: Option<String>,
    overlay: Option<PixelRect>,
    snapshot_bytes: Option<usize>,
    stats: PipelineStats,
    frames_dropped: u64,
}

fn script() -> Vec<Vec<ScriptedDetection>> {
    let centered = NormalizedRect::new(0.3, 0.35, 0.6, 0.7);
    vec![
        vec![ScriptedDetection {
            class: CUP,
            score: 0.3,
            location: centered,
        }],
        vec![ScriptedDetection {
            class: CUP,
            score: 0.6,
            location: centered,
        }],
        vec![ScriptedDetection {
            class: DOG,
            score: 0.9,
            location: centered,
        }],
    ]
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    let mut config = SeekConfig::for_target(&args.target);
    if args.front {
        config.lens_facing = LensFacing::Front;
    }
    config.source = SourceConfig {
        url: "stub://demo".to_string(),
        fps: args.fps,
        ..SourceConfig::default()
    };

    let backend = script()
        .into_iter()
        .fold(StubBackend::new(args.input_size, args.input_size), |b, frame| {
            b.with_frame(frame)
        });
    let labels = LabelMap::from_lines(DEMO_LABELS, config.label_offset)?;
    let (session, mut subscription) = Session::with_labels(&config, Box::new(backend), labels)?;
    let mut source = CameraSource::new(config.source.clone())?;

    let interval = Duration::from_secs_f64(1.0 / f64::from(args.fps));
    for _ in 0..args.frames {
        let Some(frame) = source.next_frame()? else {
            break;
        };
        session.deliver(frame);
        // Give the worker time to take each frame so none are evicted.
        std::thread::sleep(interval);
    }

    let matched = subscription
        .wait_for_snapshot(Duration::from_millis(500))
        .is_some();
    let state = subscription.poll().clone();
    let frames_dropped = session.frames_dropped();
    let stats = session.shutdown()?;

    let summary = DemoSummary {
        target: config.target_label,
        matched,
        caption: state.overlay.as_ref().map(|o| o.caption.clone()),
        overlay: state.overlay.as_ref().map(|o| o.rect),
        snapshot_bytes: state.snapshot.as_ref().map(|s| s.png.len()),
        stats,
        frames_dropped,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if source.outstanding() != 0 {
        return Err(anyhow!("{} frames were never released", source.outstanding()));
    }
    Ok(())
}
