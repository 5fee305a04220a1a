use crate::detect::{normalize_label, Detection};

/// Minimum score for a detection to count as a match.
pub const ACCURACY_THRESHOLD: f32 = 0.5;

/// Match rule: score at or above the threshold and label equal to the target.
///
/// The target is normalised once here; decoded labels are normalised when the
/// label list is loaded, so the per-frame check is a plain comparison.
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptancePolicy {
    target: String,
    threshold: f32,
}

impl AcceptancePolicy {
    pub fn new(target: &str, threshold: f32) -> Self {
        Self {
            target: normalize_label(target),
            threshold,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.score >= self.threshold && detection.label == self.target
    }
}
