use serde::Serialize;

/// Rectangle in `[0, 1]` fractions of the model input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct NormalizedRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl NormalizedRect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Clip every edge into `[0, 1]` and order the edges.
    pub fn clipped(self) -> Self {
        let clip = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let (l, r) = (clip(self.left), clip(self.right));
        let (t, b) = (clip(self.top), clip(self.bottom));
        Self {
            left: l.min(r),
            top: t.min(b),
            right: l.max(r),
            bottom: t.max(b),
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// One decoded candidate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    /// Lower-cased label from the label list.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub score: f32,
    pub location: NormalizedRect,
}

impl Detection {
    /// Overlay caption, e.g. `0.87 cup`.
    pub fn caption(&self) -> String {
        format!("{:.2} {}", self.score, self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipping_bounds_and_orders_edges() {
        let rect = NormalizedRect::new(1.2, 0.6, -0.1, f32::NAN).clipped();
        assert_eq!(rect, NormalizedRect::new(0.0, 0.0, 1.0, 0.6));
    }

    #[test]
    fn caption_uses_two_decimals() {
        let det = Detection {
            label: "cup".to_string(),
            score: 0.876,
            location: NormalizedRect::default(),
        };
        assert_eq!(det.caption(), "0.88 cup");
    }
}
