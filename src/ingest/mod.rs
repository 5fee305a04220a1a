//! Frame ingestion.
//!
//! - `normalize`: raw luma/chroma frames to the session's RGB buffer
//! - `latest`: keep-latest delivery slot between camera and worker
//! - `source`: camera stand-ins (synthetic `stub://` and raw file replay)
//!
//! Frames are single-use: whoever holds a `RawFrame` last must release it, and
//! stale frames are released rather than queued.

pub mod latest;
pub mod normalize;
pub mod source;

pub use latest::{latest_channel, FrameReceiver, FrameSender};
pub use normalize::{convert, convert_into, validate};
pub use source::{CameraSource, SourceConfig, SourceStats};
