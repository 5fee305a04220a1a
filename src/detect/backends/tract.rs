#![cfg(feature = "backend-tract")]

use std::path::Path;

use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceBackend, RawOutputs};
use crate::error::{PipelineError, Result};
use crate::preprocess::{InputSize, Tensor as InputTensor};

const BOXES: usize = 0;
const CLASSES: usize = 1;
const SCORES: usize = 2;
const COUNT: usize = 3;

/// Tract-based backend for an SSD-style quantized detection model in ONNX form.
///
/// The model takes a `(1, H, W, 3)` image tensor and produces four outputs:
/// boxes `[1, N, 4]`, classes `[1, N]`, scores `[1, N]` and count `[1]`.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input: InputSize,
    max_detections: usize,
}

impl TractBackend {
    /// Load a model from disk and prepare it for inference.
    ///
    /// `quantized` selects a `u8` input fact; otherwise the model takes `f32`.
    pub fn new<P: AsRef<Path>>(model_path: P, input: InputSize, quantized: bool) -> Result<Self> {
        let model_path = model_path.as_ref();
        let load_err = |stage: &str, e: TractError| {
            PipelineError::model_load(format!("{} {}: {}", stage, model_path.display(), e))
        };
        let datum = if quantized {
            u8::datum_type()
        } else {
            f32::datum_type()
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| load_err("failed to load model", e))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    datum,
                    tvec!(1, input.height as usize, input.width as usize, 3),
                ),
            )
            .map_err(|e| load_err("failed to set input fact for", e))?
            .into_optimized()
            .map_err(|e| load_err("failed to optimize", e))?
            .into_runnable()
            .map_err(|e| load_err("failed to build runnable", e))?;

        let outputs = model.model().outputs.len();
        if outputs != 4 {
            return Err(PipelineError::model_load(format!(
                "expected 4 outputs (boxes, classes, scores, count), model declares {}",
                outputs
            )));
        }
        let max_detections = model
            .model()
            .output_fact(SCORES)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().map(|dims| dims.iter().product()))
            .ok_or_else(|| {
                PipelineError::model_load("scores output has no concrete shape".to_string())
            })?;

        Ok(Self {
            model,
            input,
            max_detections,
        })
    }

    fn build_input(&self, tensor: &InputTensor) -> Result<Tensor> {
        let shape = tensor.shape();
        let converted = match tensor {
            InputTensor::Quantized(data) => tract_ndarray::Array4::from_shape_vec(
                (shape[0], shape[1], shape[2], shape[3]),
                data.iter().copied().collect(),
            )
            .map(|a| a.into_tensor()),
            InputTensor::Float(data) => tract_ndarray::Array4::from_shape_vec(
                (shape[0], shape[1], shape[2], shape[3]),
                data.iter().copied().collect(),
            )
            .map(|a| a.into_tensor()),
        };
        converted.map_err(|e| PipelineError::inference(format!("input tensor: {}", e)))
    }

    fn extract(outputs: &TVec<TValue>, index: usize) -> Result<Vec<f32>> {
        let output = outputs
            .get(index)
            .ok_or_else(|| PipelineError::inference(format!("model produced no output {}", index)))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| PipelineError::inference(format!("output {} was not f32: {}", index, e)))?;
        Ok(view.iter().copied().collect())
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_shape(&self) -> [usize; 4] {
        [1, self.input.height as usize, self.input.width as usize, 3]
    }

    fn infer(&mut self, input: &InputTensor) -> Result<RawOutputs> {
        let input = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| PipelineError::inference(format!("inference failed: {}", e)))?;

        let boxes = Self::extract(&outputs, BOXES)?;
        if boxes.len() != self.max_detections * 4 {
            return Err(PipelineError::inference(format!(
                "expected {} box values, got {}",
                self.max_detections * 4,
                boxes.len()
            )));
        }
        let count = Self::extract(&outputs, COUNT)?
            .first()
            .copied()
            .unwrap_or(0.0);

        Ok(RawOutputs {
            boxes: boxes
                .chunks_exact(4)
                .map(|b| [b[0], b[1], b[2], b[3]])
                .collect(),
            classes: Self::extract(&outputs, CLASSES)?,
            scores: Self::extract(&outputs, SCORES)?,
            count,
        })
    }
}
