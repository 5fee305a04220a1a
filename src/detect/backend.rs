use crate::error::{PipelineError, Result};
use crate::preprocess::Tensor;

/// Raw output arrays of an SSD-style detection model.
///
/// `boxes` rows are `(top, left, bottom, right)` in model-input fractions;
/// `classes` holds class indices as floats. All three per-detection arrays share
/// the model's declared max-detections length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawOutputs {
    pub boxes: Vec<[f32; 4]>,
    pub classes: Vec<f32>,
    pub scores: Vec<f32>,
    /// Number of valid detections reported by the model.
    pub count: f32,
}

impl RawOutputs {
    /// Declared max-detections, after checking the arrays agree.
    pub fn len(&self) -> Result<usize> {
        let n = self.scores.len();
        if self.boxes.len() != n || self.classes.len() != n {
            return Err(PipelineError::inference(format!(
                "output length mismatch: boxes {}, classes {}, scores {}",
                self.boxes.len(),
                self.classes.len(),
                n
            )));
        }
        Ok(n)
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Inference backend trait.
///
/// A backend owns the loaded model. `infer` runs one blocking forward pass;
/// callers never run two passes concurrently on the same backend.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Declared input shape, `(1, H, W, 3)`.
    fn input_shape(&self) -> [usize; 4];

    /// Run one forward pass.
    fn infer(&mut self, input: &Tensor) -> Result<RawOutputs>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_output_lengths_are_inference_errors() {
        let outputs = RawOutputs {
            boxes: vec![[0.0; 4]; 2],
            classes: vec![0.0; 3],
            scores: vec![0.0; 3],
            count: 3.0,
        };
        assert!(matches!(outputs.len(), Err(PipelineError::Inference(_))));
    }
}
