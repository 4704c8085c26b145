//! Thumbnail normalization.
//!
//! Decodes any common raster format, flattens transparency onto an opaque
//! background, shrinks to fit the bounding box (never enlarging), and always
//! re-encodes to JPEG so every stored preview has the same format.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader, Limits, Rgb, RgbImage};

use crate::error::ImageError;
use crate::types::config::NormalizeConfig;

/// JPEG bytes within the configured bounding box.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Target dimensions for shrink-to-fit within `max_width` × `max_height`.
///
/// Sources already inside the box keep their size.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let target_w = ((width as f64 * scale).round() as u32).clamp(1, max_width.min(width));
    let target_h = ((height as f64 * scale).round() as u32).clamp(1, max_height.min(height));
    (target_w, target_h)
}

/// Normalize raw image bytes into a preview thumbnail.
pub fn normalize(bytes: &[u8], config: &NormalizeConfig) -> Result<NormalizedImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    let decoded = decode(bytes, config)?;
    let flattened = flatten(&decoded, config.background);

    let (width, height) = fit_within(
        flattened.width(),
        flattened.height(),
        config.max_width,
        config.max_height,
    );
    let resized = if (width, height) == flattened.dimensions() {
        flattened
    } else {
        image::imageops::resize(&flattened, width, height, FilterType::Lanczos3)
    };

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, config.quality)
        .write_image(resized.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(ImageError::Encode)?;

    Ok(NormalizedImage {
        bytes: out,
        width,
        height,
    })
}

/// Dimensions read from the image header, without decoding pixels.
///
/// Fails for empty input, unrecognized formats (SVG, HTML) and formats this
/// build cannot decode.
pub fn peek_dimensions(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(image::ImageError::IoError(e)))?
        .into_dimensions()
        .map_err(ImageError::Decode)
}

/// Run [`normalize`] on the blocking pool.
pub async fn normalize_blocking(
    bytes: Vec<u8>,
    config: NormalizeConfig,
) -> Result<NormalizedImage, ImageError> {
    tokio::task::spawn_blocking(move || normalize(&bytes, &config))
        .await
        .map_err(|e| ImageError::Task(e.to_string()))?
}

fn decode(bytes: &[u8], config: &NormalizeConfig) -> Result<DynamicImage, ImageError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(image::ImageError::IoError(e)))?;

    let mut limits = Limits::default();
    limits.max_alloc = Some(config.max_decode_alloc);
    reader.limits(limits);

    reader.decode().map_err(ImageError::Decode)
}

fn flatten(image: &DynamicImage, background: [u8; 3]) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blend = |channel: u8, bg: u8| -> u8 {
            ((channel as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8
        };
        out.put_pixel(
            x,
            y,
            Rgb([
                blend(pixel[0], background[0]),
                blend(pixel[1], background[1]),
                blend(pixel[2], background[2]),
            ]),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgba, RgbaImage};
    use proptest::prelude::*;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([40, 90, 160]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    fn transparent_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_fit_within_examples() {
        assert_eq!(fit_within(2000, 1000, 600, 315), (600, 300));
        assert_eq!(fit_within(1200, 630, 600, 315), (600, 315));
        assert_eq!(fit_within(300, 3000, 600, 315), (32, 315));
        assert_eq!(fit_within(100, 50, 600, 315), (100, 50));
        assert_eq!(fit_within(10_000, 1, 600, 315), (600, 1));
    }

    #[test]
    fn test_large_jpeg_is_shrunk() {
        let out = normalize(&jpeg(2000, 1000), &NormalizeConfig::default()).unwrap();
        assert_eq!((out.width, out.height), (600, 300));

        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (600, 300));
        assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_small_png_is_reencoded_not_upscaled() {
        let out = normalize(&transparent_png(100, 50), &NormalizeConfig::default()).unwrap();
        assert_eq!((out.width, out.height), (100, 50));
        assert_eq!(
            image::guess_format(&out.bytes).unwrap(),
            ImageFormat::Jpeg
        );

        // Fully transparent pixels land on the white background.
        let decoded = image::load_from_memory(&out.bytes).unwrap().to_rgb8();
        let px = decoded.get_pixel(50, 25);
        assert!(px.0.iter().all(|c| *c > 240), "expected white, got {:?}", px);
    }

    #[test]
    fn test_rejects_empty_and_corrupt() {
        let config = NormalizeConfig::default();
        assert!(matches!(normalize(&[], &config), Err(ImageError::Empty)));
        assert!(matches!(
            normalize(b"definitely not an image", &config),
            Err(ImageError::Decode(_))
        ));

        let mut truncated = jpeg(400, 400);
        truncated.truncate(64);
        assert!(normalize(&truncated, &config).is_err());
    }

    #[test]
    fn test_peek_dimensions() {
        assert_eq!(peek_dimensions(&jpeg(320, 200)).unwrap(), (320, 200));
        assert_eq!(peek_dimensions(&transparent_png(10, 4)).unwrap(), (10, 4));

        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"></svg>"#;
        assert!(matches!(peek_dimensions(svg), Err(ImageError::Decode(_))));
        assert!(matches!(
            peek_dimensions(b"<!doctype html><html></html>"),
            Err(ImageError::Decode(_))
        ));
        assert!(matches!(peek_dimensions(&[]), Err(ImageError::Empty)));
    }

    #[test]
    fn test_decode_limit_applies() {
        let config = NormalizeConfig {
            max_decode_alloc: 1024,
            ..Default::default()
        };
        assert!(matches!(
            normalize(&jpeg(500, 500), &config),
            Err(ImageError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_normalize_blocking() {
        let out = normalize_blocking(jpeg(1200, 630), NormalizeConfig::default())
            .await
            .unwrap();
        assert_eq!((out.width, out.height), (600, 315));
    }

    proptest! {
        #[test]
        fn prop_fit_within_bounds_and_aspect(w in 1u32..6000, h in 1u32..6000) {
            let (tw, th) = fit_within(w, h, 600, 315);
            prop_assert!(tw <= 600 && th <= 315);
            prop_assert!(tw <= w && th <= h);
            prop_assert!(tw >= 1 && th >= 1);
            if w > 600 || h > 315 {
                // Aspect ratio within one pixel of rounding on the scaled axis.
                let expected_h = h as f64 * tw as f64 / w as f64;
                let expected_w = w as f64 * th as f64 / h as f64;
                prop_assert!((th as f64 - expected_h).abs() <= 1.0 + expected_h * 0.01
                    || (tw as f64 - expected_w).abs() <= 1.0 + expected_w * 0.01);
            } else {
                prop_assert_eq!((tw, th), (w, h));
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_normalized_output_fits(w in 1u32..1400, h in 1u32..1400) {
            let out = normalize(&jpeg(w, h), &NormalizeConfig::default()).unwrap();
            let decoded = image::load_from_memory(&out.bytes).unwrap();
            prop_assert_eq!(decoded.dimensions(), (out.width, out.height));
            prop_assert!(out.width <= 600 && out.height <= 315);
            prop_assert!(out.width <= w && out.height <= h);
        }
    }
}
