//! Camera frame types.
//!
//! - `RawFrame`: single-use camera frame. Plane bytes are private to the crate and the
//!   frame carries a lease that hands it back to the camera subsystem exactly once.
//! - `RgbBuffer`: interleaved RGB raster, allocated once per session and rewritten in place.
//! - `FrameLeases`: outstanding-frame accounting for sources.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Metadata enums
// ----------------------------------------------------------------------------

/// Pixel layout of a raw camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Y plane followed by interleaved V/U (Android default).
    Nv21,
    /// Y plane followed by interleaved U/V.
    Nv12,
    /// Y plane, then U plane, then V plane.
    I420,
    /// Already packed RGB.
    Rgb24,
}

impl PixelFormat {
    /// Bytes occupied by a `width` x `height` frame, or `None` on overflow.
    ///
    /// Chroma planes are subsampled 2x2; odd dimensions round up.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let w = width as usize;
        let h = height as usize;
        let luma = w.checked_mul(h)?;
        match self {
            PixelFormat::Rgb24 => luma.checked_mul(3),
            PixelFormat::Nv21 | PixelFormat::Nv12 | PixelFormat::I420 => {
                let chroma = w.div_ceil(2).checked_mul(h.div_ceil(2))?;
                luma.checked_add(chroma.checked_mul(2)?)
            }
        }
    }
}

/// Which camera produced the frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    Front,
    #[default]
    Back,
}

impl LensFacing {
    pub fn is_front(self) -> bool {
        matches!(self, LensFacing::Front)
    }
}

// ----------------------------------------------------------------------------
// RawFrame
// ----------------------------------------------------------------------------

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Raw camera frame, valid for one analysis cycle.
///
/// The frame is not `Clone`. Its lease is returned to the source on the first
/// call to [`RawFrame::release`]; dropping an unreleased frame releases it too,
/// so a frame can never stall the source.
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation needed to bring the frame upright.
    pub rotation_degrees: i32,
    pub format: PixelFormat,
    pub sequence: u64,
    lease: Option<ReleaseFn>,
}

impl RawFrame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        rotation_degrees: i32,
        format: PixelFormat,
    ) -> Self {
        Self {
            data,
            width,
            height,
            rotation_degrees,
            format,
            sequence: 0,
            lease: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Attach the callback that hands the frame back to its source.
    pub fn with_lease<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.lease = Some(Box::new(release));
        self
    }

    /// Plane bytes. Only the converter reads them.
    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    /// Return the frame to its source. Subsequent calls are no-ops.
    pub fn release(&mut self) {
        if let Some(release) = self.lease.take() {
            release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.lease.is_none()
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.release();
    }
}

// ----------------------------------------------------------------------------
// FrameLeases: outstanding-frame accounting
// ----------------------------------------------------------------------------

/// Counts frames handed out by a source and not yet released.
#[derive(Clone, Debug, Default)]
pub struct FrameLeases {
    outstanding: Arc<AtomicUsize>,
    released: Arc<AtomicU64>,
}

impl FrameLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease a frame: it counts as outstanding until its release callback runs.
    pub fn lease(&self, frame: RawFrame) -> RawFrame {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let outstanding = self.outstanding.clone();
        let released = self.released.clone();
        frame.with_lease(move || {
            outstanding.fetch_sub(1, Ordering::SeqCst);
            released.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// RgbBuffer
// ----------------------------------------------------------------------------

/// Interleaved RGB raster. Dimensions are fixed at allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbBuffer {
    image: RgbImage,
}

impl RgbBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
        }
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Packed RGB bytes, row-major. Length never changes.
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
