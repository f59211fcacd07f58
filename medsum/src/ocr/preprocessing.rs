use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};

use crate::config::OcrConfig;
use crate::error::{MedsumError, Result};

/// Prepare raw image bytes for OCR.
///
/// Validates dimensions against the configured limits, downsizes large
/// scans, converts to grayscale, strips the alpha channel, and stretches
/// contrast. Returns PNG bytes ready for any engine.
pub fn preprocess_image(bytes: &[u8], config: &OcrConfig) -> Result<Vec<u8>> {
    let reader = ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| MedsumError::Decode(format!("Failed to read image: {e}")))?;

    let img = reader
        .decode()
        .map_err(|e| MedsumError::Decode(format!("Failed to decode image: {e}")))?;

    let (width, height) = img.dimensions();
    if width < config.min_image_dimension || height < config.min_image_dimension {
        return Err(MedsumError::Decode(format!(
            "Image too small: {}x{}, minimum {}x{}",
            width, height, config.min_image_dimension, config.min_image_dimension
        )));
    }

    let img = resize_if_needed(img, config.max_image_dimension);
    let img = remove_alpha(img.grayscale());
    let img = enhance_contrast(img);

    let mut output = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut output), ImageFormat::Png)
        .map_err(|e| MedsumError::Decode(format!("Failed to encode image: {e}")))?;

    Ok(output)
}

/// Downscale with Lanczos3 when either dimension exceeds `max_dim`,
/// preserving aspect ratio.
fn resize_if_needed(img: DynamicImage, max_dim: u32) -> DynamicImage {
    let (width, height) = img.dimensions();

    if width <= max_dim && height <= max_dim {
        return img;
    }

    let ratio = if width > height {
        max_dim as f32 / width as f32
    } else {
        max_dim as f32 / height as f32
    };

    let new_width = (width as f32 * ratio) as u32;
    let new_height = (height as f32 * ratio) as u32;

    img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

fn remove_alpha(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgba8(rgba) => {
            DynamicImage::ImageRgb8(image::RgbImage::from_fn(
                rgba.width(),
                rgba.height(),
                |x, y| {
                    let pixel = rgba.get_pixel(x, y);
                    image::Rgb([pixel[0], pixel[1], pixel[2]])
                },
            ))
        }
        DynamicImage::ImageLumaA8(luma_a) => {
            DynamicImage::ImageLuma8(image::GrayImage::from_fn(
                luma_a.width(),
                luma_a.height(),
                |x, y| {
                    let pixel = luma_a.get_pixel(x, y);
                    image::Luma([pixel[0]])
                },
            ))
        }
        _ => img,
    }
}

fn enhance_contrast(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(gray) => {
            DynamicImage::ImageLuma8(stretch_grayscale_histogram(gray))
        }
        DynamicImage::ImageRgb8(rgb) => {
            let gray = DynamicImage::ImageRgb8(rgb).to_luma8();
            DynamicImage::ImageLuma8(stretch_grayscale_histogram(gray))
        }
        _ => img,
    }
}

/// Linear histogram stretch: darkest pixel to 0, lightest to 255.
/// Flat images pass through unchanged.
fn stretch_grayscale_histogram(gray: image::GrayImage) -> image::GrayImage {
    let mut min_val = 255u8;
    let mut max_val = 0u8;

    for pixel in gray.pixels() {
        let val = pixel[0];
        min_val = min_val.min(val);
        max_val = max_val.max(val);
    }

    if max_val <= min_val {
        return gray;
    }

    let range = (max_val - min_val) as f32;
    image::GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let pixel = gray.get_pixel(x, y);
        let normalized = (pixel[0] - min_val) as f32 / range;
        image::Luma([(normalized * 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> OcrConfig {
        OcrConfig {
            engines: vec!["tesseract".to_string()],
            languages: "heb+eng".to_string(),
            timeout_secs: 30,
            max_image_dimension: 4096,
            min_image_dimension: 50,
        }
    }

    fn test_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut output = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut output), ImageFormat::Png)
            .unwrap();
        output
    }

    #[test]
    fn test_preprocess_valid_image() {
        let result = preprocess_image(&test_png(100, 100), &test_config());
        assert!(result.is_ok(), "preprocessing failed: {:?}", result.err());
        assert!(!result.unwrap().is_empty());
    }

    #[test]
    fn test_reject_tiny_image() {
        let result = preprocess_image(&test_png(10, 10), &test_config());
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("too small"), "unexpected error: {err}");
    }

    #[test]
    fn test_reject_invalid_bytes() {
        let result = preprocess_image(&[0u8, 1, 2, 3, 4, 5], &test_config());
        assert!(result.is_err());
    }

    #[test]
    fn test_resize_preserves_aspect_ratio() {
        let img = DynamicImage::new_rgb8(2000, 500);
        let resized = resize_if_needed(img, 1000);
        let (w, h) = resized.dimensions();
        assert_eq!(w, 1000);
        assert_eq!(h, 250);
    }

    #[test]
    fn test_resize_skipped_when_small_enough() {
        let img = DynamicImage::new_rgb8(500, 500);
        let resized = resize_if_needed(img, 1000);
        assert_eq!(resized.dimensions(), (500, 500));
    }

    #[test]
    fn test_rgba_loses_alpha() {
        let rgba = DynamicImage::new_rgba8(100, 100);
        match remove_alpha(rgba) {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => {}
            other => panic!("alpha channel survived: {:?}", other.color()),
        }
    }

    #[test]
    fn test_flat_image_contrast_unchanged() {
        let gray = image::GrayImage::from_pixel(10, 10, image::Luma([100]));
        let stretched = stretch_grayscale_histogram(gray);
        for pixel in stretched.pixels() {
            assert_eq!(pixel[0], 100);
        }
    }

    #[test]
    fn test_contrast_stretch_expands_range() {
        let mut gray = image::GrayImage::new(10, 10);
        for (i, pixel) in gray.pixels_mut().enumerate() {
            pixel[0] = (100 + (i % 50)) as u8;
        }
        let stretched = stretch_grayscale_histogram(gray);
        let min = stretched.pixels().map(|p| p[0]).min().unwrap();
        let max = stretched.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(min, 0);
        assert!(max > 200);
    }
}
