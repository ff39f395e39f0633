//! Image validation and transcoding.
//!
//! Downloaded bytes are validated (size gates, magic-byte sniff, minimum
//! dimensions) and normalized to a bounded RGB JPEG. Alpha channels are
//! composited onto a white background. Malformed input is a typed error the
//! caller skips, never a panic.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::debug;

use crate::domain::product::ProcessedImage;
use crate::error::ScrapeError;
use crate::infrastructure::config::ImageConfig;

pub struct ImageProcessor {
    config: ImageConfig,
}

/// Recognized container formats by file signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
}

/// Identify an image container from its leading bytes.
pub fn sniff_format(bytes: &[u8]) -> Option<SniffedFormat> {
    if bytes.len() < 12 {
        return None;
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(SniffedFormat::Jpeg);
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(SniffedFormat::Png);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(SniffedFormat::Gif);
    }
    if bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some(SniffedFormat::Webp);
    }
    if bytes.starts_with(b"BM") {
        return Some(SniffedFormat::Bmp);
    }
    None
}

impl ImageProcessor {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    /// Validate and transcode downloaded bytes into a catalog-ready JPEG.
    ///
    /// The returned image carries placeholder ordering; the download
    /// fan-out assigns `order`, `is_main` and the final filename.
    pub fn process(&self, bytes: &[u8], original_url: &str) -> Result<ProcessedImage, ScrapeError> {
        if bytes.len() < self.config.min_bytes {
            return Err(ScrapeError::invalid_image(format!(
                "{} bytes is below the {} byte minimum",
                bytes.len(),
                self.config.min_bytes
            )));
        }
        if bytes.len() > self.config.max_bytes {
            return Err(ScrapeError::invalid_image(format!(
                "{} bytes exceeds the {} byte maximum",
                bytes.len(),
                self.config.max_bytes
            )));
        }
        let format = sniff_format(bytes)
            .ok_or_else(|| ScrapeError::invalid_image("unrecognized file signature"))?;
        debug!(?format, len = bytes.len(), "decoding image");

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ScrapeError::invalid_image(format!("decode failed: {e}")))?;

        let (width, height) = decoded.dimensions();
        if width < self.config.min_dimension || height < self.config.min_dimension {
            return Err(ScrapeError::invalid_image(format!(
                "{width}x{height} is icon-sized, not a product photo"
            )));
        }

        let rgb = flatten_to_rgb(decoded);

        let max = self.config.max_dimension;
        let bounded = if rgb.width() > max || rgb.height() > max {
            DynamicImage::ImageRgb8(rgb)
                .resize(max, max, FilterType::Lanczos3)
                .to_rgb8()
        } else {
            rgb
        };

        let (final_width, final_height) = bounded.dimensions();
        let mut content = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut content, self.config.jpeg_quality);
        DynamicImage::ImageRgb8(bounded)
            .write_with_encoder(encoder)
            .map_err(|e| ScrapeError::invalid_image(format!("JPEG encode failed: {e}")))?;

        Ok(ProcessedImage {
            content,
            width: final_width,
            height: final_height,
            original_url: original_url.to_string(),
            filename: String::new(),
            is_main: false,
            order: 0,
        })
    }
}

/// Normalize any color mode to RGB, compositing alpha onto white.
fn flatten_to_rgb(image: DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other if other.color().has_alpha() => {
            let rgba = other.to_rgba8();
            let (width, height) = rgba.dimensions();
            let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
            for (x, y, pixel) in rgba.enumerate_pixels() {
                let alpha = u32::from(pixel[3]);
                let blend =
                    |fg: u8, bg: u8| ((u32::from(fg) * alpha + u32::from(bg) * (255 - alpha)) / 255) as u8;
                canvas.put_pixel(
                    x,
                    y,
                    Rgb([
                        blend(pixel[0], 255),
                        blend(pixel[1], 255),
                        blend(pixel[2], 255),
                    ]),
                );
            }
            canvas
        }
        other => other.to_rgb8(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn processor() -> ImageProcessor {
        ImageProcessor::new(ImageConfig::default())
    }

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn rejects_tiny_payloads_without_panicking() {
        let result = processor().process(&[0xFF, 0xD8], "http://x/a.jpg");
        assert!(matches!(result, Err(ScrapeError::InvalidImage(_))));
    }

    #[test]
    fn rejects_html_error_pages() {
        let body = "<html><body>404 not found</body></html>".repeat(100);
        let result = processor().process(body.as_bytes(), "http://x/a.jpg");
        assert!(matches!(result, Err(ScrapeError::InvalidImage(_))));
    }

    #[test]
    fn rejects_icon_sized_images() {
        let icon = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 20, 30])));
        let bytes = png_bytes(&icon);
        let lenient_bytes = ImageProcessor::new(ImageConfig {
            min_bytes: 10,
            ..ImageConfig::default()
        });
        let result = lenient_bytes.process(&bytes, "http://x/icon.png");
        assert!(matches!(result, Err(ScrapeError::InvalidImage(_))));
    }

    #[test]
    fn transcodes_large_rgba_png_to_bounded_rgb_jpeg() {
        let mut rgba = RgbaImage::from_pixel(3000, 2000, Rgba([200, 10, 10, 128]));
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let bytes = png_bytes(&DynamicImage::ImageRgba8(rgba));

        let processed = processor()
            .process(&bytes, "http://x/big.png")
            .expect("valid image should transcode");

        assert!(processed.width.max(processed.height) <= 1500);
        assert!(processed.width > 0 && processed.height > 0);
        // Output is a JPEG.
        assert_eq!(sniff_format(&processed.content), Some(SniffedFormat::Jpeg));
        // Aspect ratio preserved (3:2).
        assert_eq!(processed.width, 1500);
        assert_eq!(processed.height, 1000);
    }

    #[test]
    fn sniffs_known_signatures() {
        let mut webp = b"RIFF".to_vec();
        webp.extend_from_slice(&[0, 0, 0, 0]);
        webp.extend_from_slice(b"WEBPVP8 ");
        assert_eq!(sniff_format(&webp), Some(SniffedFormat::Webp));
        assert_eq!(sniff_format(b"GIF89a-some-payload"), Some(SniffedFormat::Gif));
        assert_eq!(sniff_format(b"plain text, not an image"), None);
    }
}
