use crate::errors::{PipelineError, Result};
use crate::raster::Raster;

use image::DynamicImage;

/// Decode raw image bytes into a [`Raster`].
///
/// Grayscale sources stay single-channel; everything else is flattened to
/// three-channel BGR. Malformed or unsupported input is a `DecodeError`.
pub fn decode(bytes: &[u8]) -> Result<Raster> {
    let image = image::load_from_memory(bytes).map_err(|e| PipelineError::DecodeError {
        message: e.to_string(),
    })?;

    match image {
        DynamicImage::ImageLuma8(gray) => {
            let (width, height) = gray.dimensions();
            Raster::new(width, height, 1, gray.into_raw())
        }
        other => {
            let rgb = other.to_rgb8();
            let (width, height) = rgb.dimensions();
            let mut data = rgb.into_raw();
            for px in data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            Raster::new(width, height, 3, data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_rgb_png_to_bgr() {
        let mut rgb = image::RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        rgb.put_pixel(1, 0, image::Rgb([40, 50, 60]));
        let bytes = png_bytes(DynamicImage::ImageRgb8(rgb));

        let raster = decode(&bytes).unwrap();
        assert_eq!(raster.width(), 2);
        assert_eq!(raster.height(), 1);
        assert_eq!(raster.channels(), 3);
        // BGR order
        assert_eq!(raster.data(), &[30, 20, 10, 60, 50, 40]);
    }

    #[test]
    fn test_decode_grayscale_png() {
        let gray = image::GrayImage::from_raw(2, 2, vec![0, 0, 255, 255]).unwrap();
        let bytes = png_bytes(DynamicImage::ImageLuma8(gray));

        let raster = decode(&bytes).unwrap();
        assert_eq!(raster.channels(), 1);
        assert_eq!(raster.data(), &[0, 0, 255, 255]);
    }

    #[test]
    fn test_decode_malformed_bytes() {
        let err = decode(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }
}
