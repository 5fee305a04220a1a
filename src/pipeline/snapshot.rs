use image::{imageops, DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::error::{PipelineError, Result};
use crate::frame::RgbBuffer;
use crate::preprocess::quarter_turns;

/// Losslessly encoded capture of the matching frame, upright and un-mirrored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub width: u32,
    pub height: u32,
    /// PNG bytes.
    pub png: Vec<u8>,
    /// Sequence number of the frame it was taken from.
    pub sequence: u64,
}

/// Rotate the buffer clockwise by `rotation_degrees`, mirror it for the front
/// lens, and encode as PNG.
pub fn capture(
    rgb: &RgbBuffer,
    rotation_degrees: i32,
    front_facing: bool,
    sequence: u64,
) -> Result<Snapshot> {
    let source = rgb.as_image();
    let rotated = match quarter_turns(rotation_degrees)? {
        1 => imageops::rotate90(source),
        2 => imageops::rotate180(source),
        3 => imageops::rotate270(source),
        _ => source.clone(),
    };
    let upright = if front_facing {
        imageops::flip_horizontal(&rotated)
    } else {
        rotated
    };

    let (width, height) = upright.dimensions();
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(upright)
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| PipelineError::Snapshot(e.to_string()))?;
    Ok(Snapshot {
        width,
        height,
        png: png.into_inner(),
        sequence,
    })
}
