use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

/// Pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Full-resolution Y plane followed by interleaved half-resolution UV.
    Nv12,
}

pub(crate) fn to_rgb_image(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbImage> {
    let luma_len = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    match format {
        PixelFormat::Rgb24 => {
            let expected = luma_len * 3;
            if pixels.len() < expected {
                return Err(anyhow!(
                    "RGB frame too short: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            RgbImage::from_raw(width, height, pixels[..expected].to_vec())
                .ok_or_else(|| anyhow!("failed to wrap {}x{} RGB buffer", width, height))
        }
        PixelFormat::Nv12 => {
            let expected = luma_len + luma_len / 2;
            if pixels.len() < expected {
                return Err(anyhow!(
                    "NV12 frame too short: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            let (y_plane, uv_plane) = pixels.split_at(luma_len);
            let w = width as usize;
            Ok(RgbImage::from_fn(width, height, |x, y| {
                let (x, y) = (x as usize, y as usize);
                let luma = y_plane[y * w + x] as f32;
                let uv = (y / 2) * w + (x / 2) * 2;
                let u = uv_plane[uv] as f32 - 128.0;
                let v = uv_plane[uv + 1] as f32 - 128.0;
                Rgb([
                    clamp_to_u8(luma + 1.402 * v),
                    clamp_to_u8(luma - 0.344_136 * u - 0.714_136 * v),
                    clamp_to_u8(luma + 1.772 * u),
                ])
            }))
        }
    }
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_nv12_is_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let rgb = to_rgb_image(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb.as_raw(), &vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn rgb_validates_length() {
        assert!(to_rgb_image(&[1u8; 9], 1, 3, PixelFormat::Rgb24).is_ok());
        assert!(to_rgb_image(&[1u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        assert!(to_rgb_image(&[1u8; 5], 2, 2, PixelFormat::Nv12).is_err());
    }
}
