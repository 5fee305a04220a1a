//! Lens Seek
//!
//! Real-time "find this object" pipeline: camera frames are converted to RGB,
//! cropped and resized for a quantized SSD-style detector, and the best
//! detection is compared against a user-chosen target label. The first
//! confident match latches the pipeline, publishes an overlay mapped onto the
//! preview surface, and captures a snapshot of the frame.
//!
//! # Architecture
//!
//! The pipeline runs under a few rules:
//!
//! 1. **Single worker**: one dedicated thread owns the detector and the RGB buffer.
//! 2. **Keep latest**: a busy worker never queues frames; stale ones are released.
//! 3. **Release once**: every delivered frame is released exactly once, processed or not.
//! 4. **Latch**: after a match, no inference runs until an explicit reset.
//! 5. **Per-frame failures are local**: a bad frame is logged and skipped.
//!
//! # Module Structure
//!
//! - `frame`: raw frames with release leases, the session RGB buffer
//! - `ingest`: pixel conversion, keep-latest delivery, frame sources
//! - `preprocess`: crop, resize, rotate and build the model input tensor
//! - `detect`: inference backends, label map, candidate decoding
//! - `mapper`: model-space boxes to preview pixels
//! - `pipeline`: acceptance policy, latch state machine, presentation events
//! - `session`: worker thread lifecycle
//! - `config`: file and environment configuration

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod mapper;
pub mod pipeline;
pub mod preprocess;
pub mod session;

pub use config::SeekConfig;
pub use detect::{
    Detection, Detector, InferenceBackend, LabelMap, NormalizedRect, RawOutputs,
    ScriptedDetection, StubBackend,
};
pub use error::{PipelineError, Result};
pub use frame::{FrameLeases, LensFacing, PixelFormat, RawFrame, RgbBuffer};
pub use ingest::{latest_channel, CameraSource, FrameReceiver, FrameSender, SourceConfig};
pub use mapper::{map_to_display, unmap_from_display, PixelRect, ViewSize};
pub use pipeline::{
    AcceptancePolicy, FrameOutcome, FramePipeline, Overlay, PipelineSettings, PipelineState,
    PipelineStats, PresentationEvent, PresentationState, Snapshot, Subscription,
};
pub use preprocess::{InputSize, Normalization, Preprocessor, Tensor};
pub use session::Session;

#[cfg(feature = "backend-tract")]
pub use detect::backends::TractBackend;
