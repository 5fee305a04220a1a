mod backend;
pub mod backends;
mod detector;
mod labels;
mod result;

pub use backend::{InferenceBackend, RawOutputs};
pub use backends::{ScriptedDetection, StubBackend};
pub use detector::{Detector, Predictions};
pub use labels::{normalize_label, LabelMap};
pub use result::{Detection, NormalizedRect};
