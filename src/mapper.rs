//! Model-space boxes to on-screen pixels.
//!
//! The model sees a centred square crop of a 4:3 preview. Mapping a box back to
//! the preview view:
//! 1. scale the normalised box into view pixels
//! 2. mirror horizontally for the front lens
//! 3. stretch the cropped axis by the 4:3 ratio plus a margin, and shrink the
//!    other axis by the same margin, around the box centre
//!
//! In portrait (`width < height`) the horizontal axis is stretched; in landscape
//! the vertical one.

use serde::Serialize;

use crate::detect::NormalizedRect;

/// Aspect ratio of the camera preview.
pub const PREVIEW_ASPECT_RATIO: f32 = 4.0 / 3.0;

/// Default margin added along the cropped axis.
pub const DEFAULT_MARGIN: f32 = 0.1;

/// Size of the preview surface in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ViewSize {
    pub width: f32,
    pub height: f32,
}

impl ViewSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_portrait(&self) -> bool {
        self.width < self.height
    }
}

/// Rectangle in view pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PixelRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl PixelRect {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Clamp the extent (not the origin) to the view, as the overlay does.
    pub fn fit_within(self, view: ViewSize) -> Self {
        Self {
            right: self.left + self.width().min(view.width),
            bottom: self.top + self.height().min(view.height),
            ..self
        }
    }

    fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }
}

/// Per-axis scale factors of step 3: `(horizontal, vertical)`.
fn aspect_factors(view: ViewSize, margin: f32) -> (f32, f32) {
    let stretch = (1.0 + margin) * PREVIEW_ASPECT_RATIO;
    let shrink = 1.0 - margin;
    if view.is_portrait() {
        (stretch, shrink)
    } else {
        (shrink, stretch)
    }
}

fn mirror(rect: PixelRect, view: ViewSize) -> PixelRect {
    PixelRect {
        left: view.width - rect.right,
        right: view.width - rect.left,
        ..rect
    }
}

fn scale_about_center(rect: PixelRect, sx: f32, sy: f32) -> PixelRect {
    let (mid_x, mid_y) = rect.center();
    let half_w = sx * rect.width() / 2.0;
    let half_h = sy * rect.height() / 2.0;
    PixelRect {
        left: mid_x - half_w,
        top: mid_y - half_h,
        right: mid_x + half_w,
        bottom: mid_y + half_h,
    }
}

/// Map a model-space box onto the preview view.
pub fn map_to_display(
    location: NormalizedRect,
    view: ViewSize,
    front_facing: bool,
    margin: f32,
) -> PixelRect {
    let preview = PixelRect {
        left: location.left * view.width,
        top: location.top * view.height,
        right: location.right * view.width,
        bottom: location.bottom * view.height,
    };
    let corrected = if front_facing {
        mirror(preview, view)
    } else {
        preview
    };
    let (sx, sy) = aspect_factors(view, margin);
    scale_about_center(corrected, sx, sy)
}

/// Inverse of [`map_to_display`].
pub fn unmap_from_display(
    rect: PixelRect,
    view: ViewSize,
    front_facing: bool,
    margin: f32,
) -> NormalizedRect {
    let (sx, sy) = aspect_factors(view, margin);
    let unscaled = scale_about_center(rect, 1.0 / sx, 1.0 / sy);
    let preview = if front_facing {
        mirror(unscaled, view)
    } else {
        unscaled
    };
    NormalizedRect {
        left: preview.left / view.width,
        top: preview.top / view.height,
        right: preview.right / view.width,
        bottom: preview.bottom / view.height,
    }
}
