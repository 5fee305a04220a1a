//! One search session: a dedicated worker thread that owns the pipeline.
//!
//! The camera side delivers frames through the keep-latest slot; the worker
//! processes them one at a time and publishes to the presentation channel.
//! Shutting the session down stops the worker, releases any pending frame
//! and drops the detector exactly once.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::SeekConfig;
use crate::detect::{Detector, InferenceBackend, LabelMap};
use crate::frame::RawFrame;
use crate::ingest::{latest_channel, FrameReceiver, FrameSender};
use crate::pipeline::{presentation_channel, FramePipeline, PipelineStats, Subscription};

enum Control {
    Reset,
    Shutdown,
}

/// Handle to a running session.
pub struct Session {
    frames: FrameSender,
    control: Sender<Control>,
    latch: Arc<AtomicBool>,
    join: Option<JoinHandle<PipelineStats>>,
}

impl Session {
    /// Load the labels and model named by `config` and start a session.
    ///
    /// Model loading happens before the worker starts, so a bad model never
    /// sees a frame.
    pub fn open(config: &SeekConfig) -> Result<(Session, Subscription)> {
        let backend = load_backend(config)?;
        Self::with_backend(config, backend)
    }

    /// Start a session around an already constructed backend.
    pub fn with_backend(
        config: &SeekConfig,
        backend: Box<dyn InferenceBackend>,
    ) -> Result<(Session, Subscription)> {
        let labels = LabelMap::load(&config.labels_path, config.label_offset)?;
        Self::with_labels(config, backend, labels)
    }

    /// Start a session with an in-memory label map.
    pub fn with_labels(
        config: &SeekConfig,
        backend: Box<dyn InferenceBackend>,
        labels: LabelMap,
    ) -> Result<(Session, Subscription)> {
        let mut detector = Detector::new(backend, labels)?;
        detector.warm_up()?;
        let (publisher, subscription) = presentation_channel();
        let pipeline = FramePipeline::new(detector, config.pipeline_settings(), publisher);
        let session = Self::spawn(pipeline)?;
        Ok((session, subscription))
    }

    /// Run `pipeline` on a new worker thread.
    pub fn spawn(pipeline: FramePipeline) -> Result<Session> {
        let (frames, frame_rx) = latest_channel();
        let (control, control_rx) = crossbeam_channel::unbounded();
        let latch = pipeline.latch_flag();
        let target = pipeline.state().target_label.clone();
        let join = std::thread::Builder::new()
            .name("seek-pipeline".to_string())
            .spawn(move || run_worker(pipeline, frame_rx, control_rx))
            .context("failed to start pipeline worker")?;
        log::info!("session started; looking for '{}'", target);
        Ok(Session {
            frames,
            control,
            latch,
            join: Some(join),
        })
    }

    /// Camera-side handle; clone it into the capture loop.
    pub fn frame_sender(&self) -> FrameSender {
        self.frames.clone()
    }

    /// Offer one frame. Returns false once the session has stopped.
    pub fn deliver(&self, frame: RawFrame) -> bool {
        self.frames.deliver(frame)
    }

    /// Leave the latched state. Takes effect before the next processed frame.
    pub fn reset(&self) {
        if self.control.send(Control::Reset).is_err() {
            log::debug!("reset ignored: session worker has stopped");
        }
    }

    pub fn is_latched(&self) -> bool {
        self.latch.load(Ordering::SeqCst)
    }

    /// Frames evicted from the delivery slot before the worker took them.
    pub fn frames_dropped(&self) -> u64 {
        self.frames.dropped()
    }

    /// Stop the worker and wait for it to finish its current frame.
    pub fn shutdown(mut self) -> Result<PipelineStats> {
        self.stop()
    }

    fn stop(&mut self) -> Result<PipelineStats> {
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("session already stopped"))?;
        let _ = self.control.send(Control::Shutdown);
        let stats = join
            .join()
            .map_err(|_| anyhow!("pipeline worker panicked"))?;
        log::info!(
            "session stopped: {} processed, {} skipped, {} failed, {} dropped before processing",
            stats.frames_processed,
            stats.frames_skipped,
            stats.frames_failed,
            self.frames.dropped()
        );
        Ok(stats)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.join.is_some() {
            if let Err(err) = self.stop() {
                log::error!("session teardown failed: {}", err);
            }
        }
    }
}

fn run_worker(
    mut pipeline: FramePipeline,
    frames: FrameReceiver,
    control: Receiver<Control>,
) -> PipelineStats {
    loop {
        select! {
            recv(control) -> msg => match msg {
                Ok(Control::Reset) => pipeline.reset(),
                Ok(Control::Shutdown) | Err(_) => break,
            },
            recv(frames.channel()) -> frame => match frame {
                Ok(frame) => {
                    // Control messages win over a frame that arrived at the same time.
                    match control.try_recv() {
                        Ok(Control::Shutdown) => {
                            drop(frame);
                            break;
                        }
                        Ok(Control::Reset) => pipeline.reset(),
                        Err(_) => {}
                    }
                    pipeline.process_frame(frame);
                }
                Err(_) => break,
            },
        }
    }
    let stats = pipeline.stats();
    // Close the slot before the detector goes away so late frames are released.
    drop(frames);
    drop(pipeline);
    stats
}

/// Build the configured on-disk backend.
#[cfg(feature = "backend-tract")]
pub fn load_backend(config: &SeekConfig) -> Result<Box<dyn InferenceBackend>> {
    let backend = crate::detect::backends::TractBackend::new(
        &config.model_path,
        config.model_input,
        config.normalization.is_identity(),
    )?;
    Ok(Box::new(backend))
}

/// Build the configured on-disk backend.
#[cfg(not(feature = "backend-tract"))]
pub fn load_backend(config: &SeekConfig) -> Result<Box<dyn InferenceBackend>> {
    Err(crate::error::PipelineError::model_load(format!(
        "cannot load {}: built without an inference backend (enable the backend-tract feature)",
        config.model_path.display()
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{NormalizedRect, ScriptedDetection, StubBackend};
    use crate::frame::{FrameLeases, PixelFormat};
    use std::time::Duration;

    fn labels() -> LabelMap {
        LabelMap::from_lines(["???", "person", "cup"], 1).expect("labels")
    }

    fn cup(score: f32) -> Vec<ScriptedDetection> {
        vec![ScriptedDetection {
            class: 1,
            score,
            location: NormalizedRect::new(0.2, 0.2, 0.6, 0.6),
        }]
    }

    fn frame(leases: &FrameLeases, seq: u64) -> RawFrame {
        leases.lease(RawFrame::new(vec![90u8; 24], 4, 4, 90, PixelFormat::Nv21).with_sequence(seq))
    }

    #[test]
    fn session_latches_and_publishes_snapshot() -> Result<()> {
        let backend = StubBackend::new(2, 2).with_frame(cup(0.7));
        let (session, mut subscription) =
            Session::with_labels(&SeekConfig::for_target("cup"), Box::new(backend), labels())?;
        let leases = FrameLeases::new();

        assert!(session.deliver(frame(&leases, 1)));
        let snapshot = subscription
            .wait_for_snapshot(Duration::from_secs(5))
            .expect("snapshot after accepted frame");
        assert_eq!(snapshot.sequence, 1);
        assert!(session.is_latched());
        assert_eq!(
            subscription.state().overlay.as_ref().map(|o| o.caption.as_str()),
            Some("0.70 cup")
        );

        let stats = session.shutdown()?;
        assert_eq!(stats.detector_invocations, 1);
        assert_eq!(leases.outstanding(), 0);
        Ok(())
    }

    #[test]
    fn frames_after_shutdown_are_released() -> Result<()> {
        let (session, _subscription) = Session::with_labels(
            &SeekConfig::for_target("cup"),
            Box::new(StubBackend::new(2, 2)),
            labels(),
        )?;
        let sender = session.frame_sender();
        session.shutdown()?;

        let leases = FrameLeases::new();
        assert!(!sender.deliver(frame(&leases, 1)));
        assert_eq!(leases.outstanding(), 0);
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn open_without_backend_is_a_model_load_error() {
        let err = Session::open(&SeekConfig::for_target("cup"))
            .err()
            .expect("no backend compiled in");
        let err = err.downcast::<crate::error::PipelineError>().expect("pipeline error");
        assert!(err.is_fatal());
    }
}
