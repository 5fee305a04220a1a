use crate::detect::backend::{InferenceBackend, RawOutputs};
use crate::detect::labels::LabelMap;
use crate::detect::result::{Detection, NormalizedRect};
use crate::error::{PipelineError, Result};
use crate::preprocess::{InputSize, Tensor};

/// Quantized object detector: a loaded backend plus its label list.
///
/// Built once per session. Dropping the detector releases the model.
pub struct Detector {
    backend: Box<dyn InferenceBackend>,
    labels: LabelMap,
    input_size: InputSize,
    invocations: u64,
}

impl Detector {
    /// Wrap a loaded backend. Fails with `ModelLoad` when the declared input
    /// shape is not `(1, H, W, 3)`.
    pub fn new(backend: Box<dyn InferenceBackend>, labels: LabelMap) -> Result<Self> {
        let input_size = InputSize::from_nhwc(&backend.input_shape())?;
        log::info!(
            "detector ready: backend={}, input {}x{}, {} labels",
            backend.name(),
            input_size.width,
            input_size.height,
            labels.len()
        );
        Ok(Self {
            backend,
            labels,
            input_size,
            invocations: 0,
        })
    }

    /// Model input size, read once from the backend's declared shape.
    pub fn input_size(&self) -> InputSize {
        self.input_size
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Forward passes run so far.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.backend.warm_up()
    }

    /// Run one forward pass and decode its outputs lazily.
    ///
    /// Candidates come back in model output order, not sorted by score.
    /// Candidates whose class has no label are skipped.
    pub fn predict(&mut self, tensor: &Tensor) -> Result<Predictions<'_>> {
        let [_, h, w, _] = tensor.shape();
        if (h, w) != (self.input_size.height as usize, self.input_size.width as usize) {
            return Err(PipelineError::inference(format!(
                "tensor {}x{} does not match model input {}x{}",
                w, h, self.input_size.width, self.input_size.height
            )));
        }
        self.invocations += 1;
        let outputs = self.backend.infer(tensor)?;
        let len = outputs.len()?;
        Ok(Predictions {
            outputs,
            labels: &self.labels,
            next: 0,
            len,
        })
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        log::debug!(
            "detector {} released after {} inferences",
            self.backend.name(),
            self.invocations
        );
    }
}

/// Lazy decoder over one inference's outputs.
pub struct Predictions<'a> {
    outputs: RawOutputs,
    labels: &'a LabelMap,
    next: usize,
    len: usize,
}

impl Predictions<'_> {
    /// Count reported by the model's `count` output.
    pub fn reported_count(&self) -> f32 {
        self.outputs.count
    }

    /// Reduce to the highest-scoring candidate.
    pub fn best(self) -> Option<Detection> {
        self.fold(None, |best: Option<Detection>, det| match best {
            Some(b) if b.score >= det.score => Some(b),
            _ => Some(det),
        })
    }

    fn decode(&self, i: usize) -> Result<Detection> {
        let label = self.labels.resolve(self.outputs.classes[i])?;
        let [top, left, bottom, right] = self.outputs.boxes[i];
        let score = self.outputs.scores[i];
        Ok(Detection {
            label: label.to_string(),
            score: if score.is_finite() {
                score.clamp(0.0, 1.0)
            } else {
                0.0
            },
            location: NormalizedRect::new(left, top, right, bottom).clipped(),
        })
    }
}

impl Iterator for Predictions<'_> {
    type Item = Detection;

    fn next(&mut self) -> Option<Detection> {
        while self.next < self.len {
            let i = self.next;
            self.next += 1;
            match self.decode(i) {
                Ok(det) => return Some(det),
                Err(err) => log::debug!("skipping detection {}: {}", i, err),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.len - self.next))
    }
}
