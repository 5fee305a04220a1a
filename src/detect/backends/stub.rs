use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::detect::backend::{InferenceBackend, RawOutputs};
use crate::detect::result::NormalizedRect;
use crate::error::Result;
use crate::preprocess::Tensor;

/// Candidate the stub emits for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptedDetection {
    /// Class index before the label offset.
    pub class: usize,
    pub score: f32,
    pub location: NormalizedRect,
}

/// Stub backend for tests and demos.
///
/// Replays a script of per-frame candidates, one script entry per forward pass;
/// once the script runs out every pass yields only zero-score slots.
pub struct StubBackend {
    height: usize,
    width: usize,
    max_detections: usize,
    script: VecDeque<Vec<ScriptedDetection>>,
    calls: Arc<AtomicU64>,
}

impl StubBackend {
    pub const DEFAULT_MAX_DETECTIONS: usize = 10;

    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            max_detections: Self::DEFAULT_MAX_DETECTIONS,
            script: VecDeque::new(),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    /// Queue the candidates for the next unscripted forward pass.
    pub fn with_frame(mut self, detections: Vec<ScriptedDetection>) -> Self {
        self.script.push_back(detections);
        self
    }

    /// Shared counter of forward passes, readable after the backend moves into a session.
    pub fn calls(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }

    fn outputs_for(&self, detections: &[ScriptedDetection]) -> RawOutputs {
        let n = self.max_detections;
        let mut outputs = RawOutputs {
            boxes: vec![[0.0; 4]; n],
            classes: vec![0.0; n],
            scores: vec![0.0; n],
            count: detections.len().min(n) as f32,
        };
        for (i, det) in detections.iter().take(n).enumerate() {
            let r = det.location;
            outputs.boxes[i] = [r.top, r.left, r.bottom, r.right];
            outputs.classes[i] = det.class as f32;
            outputs.scores[i] = det.score;
        }
        outputs
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_shape(&self) -> [usize; 4] {
        [1, self.height, self.width, 3]
    }

    fn infer(&mut self, _input: &Tensor) -> Result<RawOutputs> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let detections = self.script.pop_front().unwrap_or_default();
        Ok(self.outputs_for(&detections))
    }
}
