//! Error taxonomy for the frame pipeline.

use thiserror::Error;

/// Errors raised by the frame pipeline and its stages.
///
/// Only [`PipelineError::ModelLoad`] is fatal. Every other variant is scoped
/// to a single frame (or a single detection) and the pipeline carries on with
/// the next one.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Model or label list unreadable, malformed, or of an unexpected shape.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// Rotation that is not a multiple of 90 degrees.
    #[error("invalid rotation: {degrees} degrees is not a multiple of 90")]
    InvalidRotation {
        /// Offending rotation.
        degrees: i32,
    },

    /// Raw frame could not be converted into the RGB buffer.
    #[error("frame conversion failed: {0}")]
    Conversion(String),

    /// Decoded class index has no entry in the label list.
    #[error("label index {index} out of range for {len} labels")]
    LabelIndexOutOfRange {
        /// Resolved index (class + label offset).
        index: usize,
        /// Number of labels loaded.
        len: usize,
    },

    /// Forward pass failed.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Snapshot of the matching frame could not be encoded.
    #[error("snapshot encoding failed: {0}")]
    Snapshot(String),
}

impl PipelineError {
    /// Creates a model load error.
    #[must_use]
    pub fn model_load(reason: impl Into<String>) -> Self {
        Self::ModelLoad(reason.into())
    }

    /// Creates a conversion error.
    #[must_use]
    pub fn conversion(reason: impl Into<String>) -> Self {
        Self::Conversion(reason.into())
    }

    /// Creates an inference error.
    #[must_use]
    pub fn inference(reason: impl Into<String>) -> Self {
        Self::Inference(reason.into())
    }

    /// True when the error must abort the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelLoad(_))
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
