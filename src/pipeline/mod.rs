//! Frame pipeline: acceptance policy, RUNNING/LATCHED state machine and the
//! events it publishes to the presentation layer.

mod controller;
pub mod events;
mod policy;
pub mod snapshot;

pub use controller::{
    DisplayGeometry, FrameOutcome, FramePipeline, Phase, PipelineSettings, PipelineState,
    PipelineStats,
};
pub use events::{presentation_channel, Overlay, PresentationEvent, PresentationState, Publisher, Subscription};
pub use policy::{AcceptancePolicy, ACCURACY_THRESHOLD};
pub use snapshot::Snapshot;
