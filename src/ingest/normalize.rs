//! Luma/chroma to packed RGB conversion.

use crate::error::{PipelineError, Result};
use crate::frame::{PixelFormat, RawFrame, RgbBuffer};

/// Convert `raw` into `out`, allocating `out` on the first call.
///
/// The buffer is only allocated for a frame that passes validation. Once
/// allocated it is never resized: a frame whose dimensions differ from the
/// buffer is rejected with [`PipelineError::Conversion`].
pub fn convert(raw: &RawFrame, out: &mut Option<RgbBuffer>) -> Result<()> {
    validate(raw)?;
    let buffer = out.get_or_insert_with(|| RgbBuffer::new(raw.width, raw.height));
    convert_into(raw, buffer)
}

/// Convert `raw` into an existing buffer of matching dimensions.
pub fn convert_into(raw: &RawFrame, out: &mut RgbBuffer) -> Result<()> {
    if raw.width != out.width() || raw.height != out.height() {
        return Err(PipelineError::conversion(format!(
            "frame size {}x{} does not match buffer {}x{}",
            raw.width,
            raw.height,
            out.width(),
            out.height()
        )));
    }
    validate(raw)?;

    let pixels = raw.data();
    let w = raw.width as usize;
    let h = raw.height as usize;
    let rgb = out.bytes_mut();
    match raw.format {
        PixelFormat::Rgb24 => rgb.copy_from_slice(pixels),
        PixelFormat::Nv21 => semi_planar_to_rgb(pixels, w, h, ChromaOrder::Vu, rgb),
        PixelFormat::Nv12 => semi_planar_to_rgb(pixels, w, h, ChromaOrder::Uv, rgb),
        PixelFormat::I420 => planar_to_rgb(pixels, w, h, rgb),
    }
    Ok(())
}

/// Check area and plane length against the declared format.
pub fn validate(raw: &RawFrame) -> Result<()> {
    if raw.width == 0 || raw.height == 0 {
        return Err(PipelineError::conversion("frame has zero area"));
    }
    let expected = raw
        .format
        .frame_len(raw.width, raw.height)
        .ok_or_else(|| PipelineError::conversion("frame dimensions overflow"))?;
    let actual = raw.data().len();
    if actual != expected {
        return Err(PipelineError::conversion(format!(
            "{:?} frame length mismatch: expected {}, got {}",
            raw.format, expected, actual
        )));
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum ChromaOrder {
    Uv,
    Vu,
}

fn semi_planar_to_rgb(pixels: &[u8], w: usize, h: usize, order: ChromaOrder, rgb: &mut [u8]) {
    let y_plane = w * h;
    let chroma_stride = w.div_ceil(2) * 2;
    for j in 0..h {
        let chroma_row = y_plane + (j / 2) * chroma_stride;
        for i in 0..w {
            let pair = chroma_row + (i / 2) * 2;
            let (u, v) = match order {
                ChromaOrder::Uv => (pixels[pair], pixels[pair + 1]),
                ChromaOrder::Vu => (pixels[pair + 1], pixels[pair]),
            };
            write_pixel(rgb, j * w + i, pixels[j * w + i], u, v);
        }
    }
}

fn planar_to_rgb(pixels: &[u8], w: usize, h: usize, rgb: &mut [u8]) {
    let y_plane = w * h;
    let chroma_w = w.div_ceil(2);
    let chroma_plane = chroma_w * h.div_ceil(2);
    let u_base = y_plane;
    let v_base = y_plane + chroma_plane;
    for j in 0..h {
        for i in 0..w {
            let c = (j / 2) * chroma_w + i / 2;
            write_pixel(
                rgb,
                j * w + i,
                pixels[j * w + i],
                pixels[u_base + c],
                pixels[v_base + c],
            );
        }
    }
}

/// BT.601 full-range YUV to RGB for a single pixel.
fn write_pixel(rgb: &mut [u8], index: usize, y: u8, u: u8, v: u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;

    let offset = index * 3;
    rgb[offset] = clamp_to_u8(r);
    rgb[offset + 1] = clamp_to_u8(g);
    rgb[offset + 2] = clamp_to_u8(b);
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> RawFrame {
        RawFrame::new(data, width, height, 0, format)
    }

    #[test]
    fn nv21_neutral_chroma_produces_gray() -> Result<()> {
        let nv21 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let mut out = None;
        convert(&frame(nv21, 2, 2, PixelFormat::Nv21), &mut out)?;
        assert_eq!(out.map(|b| b.as_bytes().to_vec()), Some(vec![128u8; 12]));
        Ok(())
    }

    #[test]
    fn nv12_and_nv21_swap_chroma_order() -> Result<()> {
        // Strong V: reddish in NV12 order, bluish once read as NV21.
        let data = [vec![100u8; 4], vec![128u8, 220u8]].concat();
        let mut nv12 = None;
        let mut nv21 = None;
        convert(&frame(data.clone(), 2, 2, PixelFormat::Nv12), &mut nv12)?;
        convert(&frame(data, 2, 2, PixelFormat::Nv21), &mut nv21)?;

        let nv12 = nv12.map(|b| b.as_bytes().to_vec()).unwrap_or_default();
        let nv21 = nv21.map(|b| b.as_bytes().to_vec()).unwrap_or_default();
        assert!(nv12[0] > nv12[2], "V-dominant pixel should be red: {:?}", &nv12[..3]);
        assert!(nv21[2] > nv21[0], "U-dominant pixel should be blue: {:?}", &nv21[..3]);
        Ok(())
    }

    #[test]
    fn i420_matches_semi_planar_for_same_samples() -> Result<()> {
        let y = vec![10u8, 60, 110, 160];
        let i420 = [y.clone(), vec![90u8], vec![170u8]].concat();
        let nv12 = [y, vec![90u8, 170u8]].concat();
        let mut a = None;
        let mut b = None;
        convert(&frame(i420, 2, 2, PixelFormat::I420), &mut a)?;
        convert(&frame(nv12, 2, 2, PixelFormat::Nv12), &mut b)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn odd_dimensions_are_supported() -> Result<()> {
        let len = PixelFormat::Nv21.frame_len(3, 3).unwrap_or_default();
        let mut out = None;
        convert(&frame(vec![128u8; len], 3, 3, PixelFormat::Nv21), &mut out)?;
        assert_eq!(out.map(|b| b.as_bytes().len()), Some(27));
        Ok(())
    }

    #[test]
    fn conversion_is_deterministic() -> Result<()> {
        let data: Vec<u8> = (0..24u32).map(|v| (v * 37 % 256) as u8).collect();
        let mut first = None;
        let mut second = None;
        convert(&frame(data.clone(), 4, 4, PixelFormat::Nv21), &mut first)?;
        convert(&frame(data, 4, 4, PixelFormat::Nv21), &mut second)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_copies_bytes() -> Result<()> {
        let pixels: Vec<u8> = (0..12).collect();
        let mut out = None;
        convert(&frame(pixels.clone(), 2, 2, PixelFormat::Rgb24), &mut out)?;
        assert_eq!(out.map(|b| b.as_bytes().to_vec()), Some(pixels));
        Ok(())
    }

    #[test]
    fn buffer_is_never_resized() -> Result<()> {
        let mut out = None;
        convert(&frame(vec![0u8; 6], 2, 2, PixelFormat::Nv21), &mut out)?;

        let err = convert(&frame(vec![0u8; 24], 4, 4, PixelFormat::Nv21), &mut out)
            .expect_err("mismatched frame must fail");
        assert!(matches!(err, PipelineError::Conversion(_)));
        assert_eq!(out.as_ref().map(|b| (b.width(), b.height())), Some((2, 2)));
        Ok(())
    }

    #[test]
    fn malformed_first_frame_does_not_allocate() -> Result<()> {
        let mut out = None;
        assert!(convert(&frame(Vec::new(), 0, 0, PixelFormat::Nv21), &mut out).is_err());
        assert!(convert(&frame(vec![0u8; 5], 2, 2, PixelFormat::Nv21), &mut out).is_err());
        assert!(out.is_none());

        convert(&frame(vec![128u8; 24], 4, 4, PixelFormat::Nv21), &mut out)?;
        assert_eq!(out.as_ref().map(|b| (b.width(), b.height())), Some((4, 4)));
        Ok(())
    }

    #[test]
    fn short_plane_is_rejected() {
        let mut out = None;
        let err = convert(&frame(vec![0u8; 5], 2, 2, PixelFormat::Nv21), &mut out)
            .expect_err("short frame must fail");
        assert!(err.to_string().contains("length mismatch"));
    }
}
