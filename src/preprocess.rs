//! Tensor preprocessing: crop-to-square, nearest-neighbour resize, rotation, normalisation.
//!
//! The op order is fixed. Preprocessing is a pure function of the RGB buffer,
//! the frame rotation and the model's declared input size.

use image::{imageops, RgbImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::frame::RgbBuffer;

/// Model input size in pixels, as declared by the `(1, H, W, 3)` input tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSize {
    pub height: u32,
    pub width: u32,
}

impl InputSize {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// Read the size from an NHWC input shape.
    pub fn from_nhwc(shape: &[usize]) -> Result<Self> {
        match shape {
            [1, h, w, 3] if *h > 0 && *w > 0 => {
                let height = u32::try_from(*h)
                    .map_err(|_| PipelineError::model_load("input height too large"))?;
                let width = u32::try_from(*w)
                    .map_err(|_| PipelineError::model_load("input width too large"))?;
                Ok(Self { height, width })
            }
            other => Err(PipelineError::model_load(format!(
                "expected input shape (1, H, W, 3), model declares {:?}",
                other
            ))),
        }
    }
}

/// Linear value transform applied after the geometric ops: `v * scale + offset`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub scale: f32,
    pub offset: f32,
}

impl Normalization {
    pub const IDENTITY: Normalization = Normalization {
        scale: 1.0,
        offset: 0.0,
    };

    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.offset == 0.0
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Model input tensor of shape `(1, H, W, 3)`.
///
/// Identity normalisation keeps the values quantized.
#[derive(Clone, Debug, PartialEq)]
pub enum Tensor {
    Quantized(Array4<u8>),
    Float(Array4<f32>),
}

impl Tensor {
    pub fn shape(&self) -> [usize; 4] {
        let dims = match self {
            Tensor::Quantized(data) => data.dim(),
            Tensor::Float(data) => data.dim(),
        };
        [dims.0, dims.1, dims.2, dims.3]
    }

    pub fn as_quantized(&self) -> Option<&Array4<u8>> {
        match self {
            Tensor::Quantized(data) => Some(data),
            Tensor::Float(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<&Array4<f32>> {
        match self {
            Tensor::Float(data) => Some(data),
            Tensor::Quantized(_) => None,
        }
    }

    /// View a quantized tensor as an RGB raster again.
    pub fn to_rgb_buffer(&self) -> Option<RgbBuffer> {
        let data = self.as_quantized()?;
        let [_, h, w, _] = self.shape();
        let image = RgbImage::from_raw(w as u32, h as u32, data.iter().copied().collect())?;
        Some(RgbBuffer::from_image(image))
    }
}

/// Clockwise quarter turns (0..4) needed to bring a frame upright.
pub fn quarter_turns(rotation_degrees: i32) -> Result<u8> {
    if rotation_degrees % 90 != 0 {
        return Err(PipelineError::InvalidRotation {
            degrees: rotation_degrees,
        });
    }
    Ok((rotation_degrees / 90).rem_euclid(4) as u8)
}

#[derive(Clone, Debug)]
pub struct Preprocessor {
    target: InputSize,
    normalization: Normalization,
}

impl Preprocessor {
    pub fn new(target: InputSize, normalization: Normalization) -> Self {
        Self {
            target,
            normalization,
        }
    }

    pub fn target_size(&self) -> InputSize {
        self.target
    }

    /// Build the model input for one frame.
    pub fn prepare(&self, rgb: &RgbBuffer, rotation_degrees: i32) -> Result<Tensor> {
        let turns = quarter_turns(rotation_degrees)?;
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(PipelineError::conversion("cannot preprocess an empty buffer"));
        }

        let square = center_crop(rgb.as_image());

        // Odd quarter turns swap axes, so resize to the transposed size first.
        let (resize_w, resize_h) = if turns % 2 == 1 {
            (self.target.height, self.target.width)
        } else {
            (self.target.width, self.target.height)
        };
        let resized = resize_nearest(&square, resize_w, resize_h);

        let upright = match turns {
            1 => imageops::rotate90(&resized),
            2 => imageops::rotate180(&resized),
            3 => imageops::rotate270(&resized),
            _ => resized,
        };

        self.to_tensor(upright)
    }

    fn to_tensor(&self, image: RgbImage) -> Result<Tensor> {
        let shape = (
            1,
            image.height() as usize,
            image.width() as usize,
            3,
        );
        let data = Array4::from_shape_vec(shape, image.into_raw())
            .map_err(|e| PipelineError::conversion(format!("tensor shape: {}", e)))?;
        if self.normalization.is_identity() {
            return Ok(Tensor::Quantized(data));
        }
        let Normalization { scale, offset } = self.normalization;
        Ok(Tensor::Float(data.mapv(|v| v as f32 * scale + offset)))
    }
}

/// Largest centred square.
fn center_crop(image: &RgbImage) -> RgbImage {
    let size = image.width().min(image.height());
    let x = (image.width() - size) / 2;
    let y = (image.height() - size) / 2;
    imageops::crop_imm(image, x, y, size, size).to_image()
}

/// Nearest-neighbour resize; same-size input comes back unchanged.
fn resize_nearest(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = image.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let sx = (x as u64 * src_w as u64 / width as u64) as u32;
        let sy = (y as u64 * src_h as u64 / height as u64) as u32;
        *image.get_pixel(sx, sy)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbBuffer {
        RgbBuffer::from_image(RgbImage::from_fn(width, height, |x, y| {
            Rgb([x as u8, y as u8, (x + y) as u8])
        }))
    }

    fn pixel(tensor: &Tensor, y: usize, x: usize) -> [u8; 3] {
        let data = tensor.as_quantized().expect("quantized tensor");
        [data[[0, y, x, 0]], data[[0, y, x, 1]], data[[0, y, x, 2]]]
    }

    #[test]
    fn output_shape_matches_target_for_every_rotation() -> Result<()> {
        let pre = Preprocessor::new(InputSize::new(6, 4), Normalization::IDENTITY);
        let rgb = gradient(16, 12);
        for rotation in [0, 90, 180, 270, -90, 450] {
            assert_eq!(pre.prepare(&rgb, rotation)?.shape(), [1, 6, 4, 3]);
        }
        Ok(())
    }

    #[test]
    fn crop_keeps_the_centred_square() -> Result<()> {
        let pre = Preprocessor::new(InputSize::new(4, 4), Normalization::IDENTITY);
        // 8x4 landscape: the centred 4x4 square starts at x = 2.
        let tensor = pre.prepare(&gradient(8, 4), 0)?;
        assert_eq!(pixel(&tensor, 0, 0), [2, 0, 2]);
        assert_eq!(pixel(&tensor, 3, 3), [5, 3, 8]);
        Ok(())
    }

    #[test]
    fn rotation_turns_clockwise() -> Result<()> {
        let pre = Preprocessor::new(InputSize::new(4, 4), Normalization::IDENTITY);
        let rgb = gradient(4, 4);
        let tensor = pre.prepare(&rgb, 90)?;
        // Clockwise: the bottom-left source pixel lands top-left.
        assert_eq!(pixel(&tensor, 0, 0), [0, 3, 3]);
        assert_eq!(pixel(&tensor, 0, 3), [0, 0, 0]);
        Ok(())
    }

    #[test]
    fn nearest_neighbour_downscale_samples_grid() -> Result<()> {
        let pre = Preprocessor::new(InputSize::new(2, 2), Normalization::IDENTITY);
        let tensor = pre.prepare(&gradient(4, 4), 0)?;
        assert_eq!(pixel(&tensor, 0, 0), [0, 0, 0]);
        assert_eq!(pixel(&tensor, 0, 1), [2, 0, 2]);
        assert_eq!(pixel(&tensor, 1, 1), [2, 2, 4]);
        Ok(())
    }

    #[test]
    fn unaligned_rotation_is_rejected() {
        let pre = Preprocessor::new(InputSize::new(4, 4), Normalization::IDENTITY);
        let err = pre.prepare(&gradient(4, 4), 45).expect_err("45 degrees");
        assert!(matches!(err, PipelineError::InvalidRotation { degrees: 45 }));
    }

    #[test]
    fn preprocessing_is_idempotent_on_correctly_shaped_input() -> Result<()> {
        let pre = Preprocessor::new(InputSize::new(5, 5), Normalization::IDENTITY);
        let rgb = gradient(5, 5);
        let first = pre.prepare(&rgb, 0)?;
        let again = first.to_rgb_buffer().expect("quantized");
        assert_eq!(again, rgb);
        assert_eq!(pre.prepare(&again, 0)?, first);
        Ok(())
    }

    #[test]
    fn non_identity_normalisation_produces_floats() -> Result<()> {
        let pre = Preprocessor::new(
            InputSize::new(2, 2),
            Normalization {
                scale: 1.0 / 255.0,
                offset: -0.5,
            },
        );
        let rgb = RgbBuffer::from_image(RgbImage::from_pixel(2, 2, Rgb([255, 0, 51])));
        let tensor = pre.prepare(&rgb, 0)?;
        let data = tensor.as_float().expect("float tensor");
        assert!((data[[0, 1, 1, 0]] - 0.5).abs() < 1e-6);
        assert!((data[[0, 1, 1, 1]] + 0.5).abs() < 1e-6);
        assert!((data[[0, 1, 1, 2]] + 0.3).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn input_size_comes_from_nhwc_shape() -> Result<()> {
        assert_eq!(InputSize::from_nhwc(&[1, 300, 300, 3])?, InputSize::new(300, 300));
        assert!(InputSize::from_nhwc(&[1, 3, 300, 300]).is_err());
        Ok(())
    }
}
