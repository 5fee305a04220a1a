use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::detect::{Detection, Detector};
use crate::error::{PipelineError, Result};
use crate::frame::{LensFacing, RawFrame, RgbBuffer};
use crate::ingest::normalize;
use crate::mapper::{map_to_display, ViewSize, DEFAULT_MARGIN};
use crate::pipeline::events::{Overlay, PresentationEvent, Publisher};
use crate::pipeline::policy::AcceptancePolicy;
use crate::pipeline::snapshot;
use crate::preprocess::{Normalization, Preprocessor};

/// Frames between throughput log lines.
const FPS_WINDOW: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    Running,
    Latched,
}

/// Controller state visible to the mapper and presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineState {
    pub target_label: String,
    pub phase: Phase,
    pub lens_facing: LensFacing,
    /// Rotation of the most recently processed frame.
    pub rotation_degrees: i32,
}

impl PipelineState {
    pub fn latched(&self) -> bool {
        self.phase == Phase::Latched
    }
}

/// Preview surface the overlay is drawn on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayGeometry {
    pub view: ViewSize,
    pub margin: f32,
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            view: ViewSize::new(480.0, 640.0),
            margin: DEFAULT_MARGIN,
        }
    }
}

/// Everything the controller needs besides the detector.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub policy: AcceptancePolicy,
    pub lens_facing: LensFacing,
    pub normalization: Normalization,
    pub display: DisplayGeometry,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub frames_failed: u64,
    pub detector_invocations: u64,
}

/// What happened to one frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Dropped unprocessed because the pipeline is latched.
    Skipped,
    /// Processed; best candidate (if any) did not satisfy the policy.
    Rejected(Option<Detection>),
    /// Processed and accepted; the pipeline is now latched.
    Accepted(Detection),
    /// Conversion, preprocessing or inference failed; frame skipped.
    Failed(PipelineError),
}

/// Per-frame orchestration: convert, preprocess, detect, apply policy, latch.
pub struct FramePipeline {
    detector: Detector,
    preprocessor: Preprocessor,
    policy: AcceptancePolicy,
    display: DisplayGeometry,
    state: PipelineState,
    latch: Arc<AtomicBool>,
    rgb: Option<RgbBuffer>,
    publisher: Publisher,
    stats: PipelineStats,
    fps: FpsMeter,
}

impl FramePipeline {
    pub fn new(detector: Detector, settings: PipelineSettings, publisher: Publisher) -> Self {
        let preprocessor = Preprocessor::new(detector.input_size(), settings.normalization);
        let state = PipelineState {
            target_label: settings.policy.target().to_string(),
            phase: Phase::Running,
            lens_facing: settings.lens_facing,
            rotation_degrees: 0,
        };
        if !detector.labels().contains(settings.policy.target()) {
            log::warn!(
                "target '{}' is not in the label list; nothing will match",
                settings.policy.target()
            );
        }
        Self {
            detector,
            preprocessor,
            policy: settings.policy,
            display: settings.display,
            state,
            latch: Arc::new(AtomicBool::new(false)),
            rgb: None,
            publisher,
            stats: PipelineStats::default(),
            fps: FpsMeter::new(),
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Shared view of the latch, for cheap checks outside the worker.
    pub fn latch_flag(&self) -> Arc<AtomicBool> {
        self.latch.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            detector_invocations: self.detector.invocations(),
            ..self.stats
        }
    }

    /// Run one frame through the pipeline. The frame is always released.
    pub fn process_frame(&mut self, mut frame: RawFrame) -> FrameOutcome {
        if self.state.latched() {
            frame.release();
            self.stats.frames_skipped += 1;
            return FrameOutcome::Skipped;
        }

        let sequence = frame.sequence;
        let rotation = frame.rotation_degrees;
        let converted = normalize::convert(&frame, &mut self.rgb);
        frame.release();
        if let Err(err) = converted {
            return self.fail(sequence, err);
        }

        match self.analyze(rotation) {
            Ok(best) => {
                self.stats.frames_processed += 1;
                self.state.rotation_degrees = rotation;
                if let Some(fps) = self.fps.tick() {
                    log::debug!("FPS: {:.02}", fps);
                }
                self.report(best, sequence)
            }
            Err(err) => self.fail(sequence, err),
        }
    }

    /// Leave the latched state and resume per-frame processing.
    pub fn reset(&mut self) {
        if self.state.latched() {
            log::info!("pipeline reset; resuming search for '{}'", self.state.target_label);
        }
        self.state.phase = Phase::Running;
        self.latch.store(false, Ordering::SeqCst);
        self.publisher.publish(PresentationEvent::Cleared);
    }

    fn analyze(&mut self, rotation: i32) -> Result<Option<Detection>> {
        let rgb = self
            .rgb
            .as_ref()
            .ok_or_else(|| PipelineError::conversion("no RGB buffer after conversion"))?;
        let tensor = self.preprocessor.prepare(rgb, rotation)?;
        Ok(self.detector.predict(&tensor)?.best())
    }

    fn report(&mut self, best: Option<Detection>, sequence: u64) -> FrameOutcome {
        let accepted = match best {
            Some(det) if self.policy.accepts(&det) => det,
            other => {
                self.publisher.publish(PresentationEvent::Cleared);
                return FrameOutcome::Rejected(other);
            }
        };

        self.state.phase = Phase::Latched;
        self.latch.store(true, Ordering::SeqCst);
        log::info!(
            "frame #{}: found '{}' ({:.2}); pausing analysis",
            sequence,
            accepted.label,
            accepted.score
        );

        let rect = map_to_display(
            accepted.location,
            self.display.view,
            self.state.lens_facing.is_front(),
            self.display.margin,
        )
        .fit_within(self.display.view);
        self.publisher.publish(PresentationEvent::Overlay(Overlay {
            caption: accepted.caption(),
            detection: accepted.clone(),
            rect,
        }));

        if let Some(rgb) = &self.rgb {
            match snapshot::capture(
                rgb,
                self.state.rotation_degrees,
                self.state.lens_facing.is_front(),
                sequence,
            ) {
                Ok(snapshot) => self.publisher.publish(PresentationEvent::Snapshot(snapshot)),
                Err(err) => log::warn!("frame #{}: {}", sequence, err),
            }
        }
        FrameOutcome::Accepted(accepted)
    }

    fn fail(&mut self, sequence: u64, err: PipelineError) -> FrameOutcome {
        log::warn!("frame #{} skipped: {}", sequence, err);
        self.stats.frames_failed += 1;
        FrameOutcome::Failed(err)
    }
}

struct FpsMeter {
    frames: u32,
    since: Instant,
}

impl FpsMeter {
    fn new() -> Self {
        Self {
            frames: 0,
            since: Instant::now(),
        }
    }

    /// Returns the rate once per window.
    fn tick(&mut self) -> Option<f32> {
        self.frames += 1;
        if self.frames < FPS_WINDOW {
            return None;
        }
        let elapsed = self.since.elapsed().as_secs_f32();
        self.frames = 0;
        self.since = Instant::now();
        (elapsed > 0.0).then(|| FPS_WINDOW as f32 / elapsed)
    }
}
