//! Stamps the signature text onto generated images.

use std::io::Cursor;
use std::sync::Arc;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

use crate::cli::WatermarkOptions;

const BUNDLED_FONT: &[u8] = include_bytes!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/fonts/DejaVuSans-Bold.ttf"
));

const MIN_FONT_SIZE: f32 = 16.0;
const FONT_SIZE_RATIO: f32 = 0.025;
const PADDING_RATIO: f32 = 0.8;
const TEXT_OPACITY: f32 = 0.6;
// 50% black shadow, scaled by the text's own alpha as canvas does.
const SHADOW_OPACITY: f32 = 0.5 * TEXT_OPACITY;
const SHADOW_OFFSET: (i64, i64) = (1, 1);
// CSS shadow blur radius 4px, which canvas renders as a gaussian of sigma = radius / 2.
const SHADOW_SIGMA: f32 = 2.0;

/// Errors while watermarking.
#[derive(Debug)]
pub enum WatermarkError {
    /// The font file could not be read.
    FontIo(std::io::Error),
    /// The font data is not a usable TrueType/OpenType font.
    Font(ab_glyph::InvalidFont),
    /// The source image could not be decoded.
    Decode(image::ImageError),
    /// The stamped image could not be encoded.
    Encode(image::ImageError),
}

impl std::fmt::Display for WatermarkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FontIo(err) => write!(f, "Failed to read watermark font: {err}"),
            Self::Font(err) => write!(f, "Invalid watermark font: {err}"),
            Self::Decode(err) => write!(f, "Failed to load image for watermarking: {err}"),
            Self::Encode(err) => write!(f, "Failed to encode watermarked image: {err}"),
        }
    }
}

impl std::error::Error for WatermarkError {}

/// Font and text used to sign every result. Cheap to clone.
#[derive(Clone)]
pub struct Watermarker {
    font: FontArc,
    text: Arc<str>,
}

impl std::fmt::Debug for Watermarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watermarker")
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}

impl Watermarker {
    /// Uses the bundled bold sans font.
    pub fn bundled(text: &str) -> Result<Self, WatermarkError> {
        let font = FontArc::try_from_slice(BUNDLED_FONT).map_err(WatermarkError::Font)?;
        Ok(Self {
            font,
            text: Arc::from(text),
        })
    }

    /// Loads the font named in `options`, or the bundled one.
    pub fn from_options(options: &WatermarkOptions) -> Result<Self, WatermarkError> {
        let Some(path) = options.watermark_font.as_deref() else {
            return Self::bundled(&options.watermark_text);
        };
        let data = std::fs::read(path).map_err(WatermarkError::FontIo)?;
        let font = FontArc::try_from_vec(data).map_err(WatermarkError::Font)?;
        debug!("Loaded watermark font from {}", path.display());
        Ok(Self {
            font,
            text: Arc::from(options.watermark_text.as_str()),
        })
    }

    /// The stamped text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Decodes `image_bytes`, stamps the text in the bottom-right corner and returns a PNG.
    pub fn apply(&self, image_bytes: &[u8]) -> Result<Vec<u8>, WatermarkError> {
        let source = image::load_from_memory(image_bytes).map_err(WatermarkError::Decode)?;
        let mut canvas = source.to_rgba8();
        self.stamp(&mut canvas);

        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(WatermarkError::Encode)?;
        Ok(buf.into_inner())
    }

    /// Draws the shadow, then the text, onto `canvas`.
    pub fn stamp(&self, canvas: &mut RgbaImage) {
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 || self.text.trim().is_empty() {
            return;
        }
        let font_size = font_size_for(width);
        let scale = PxScale::from(font_size);
        let padding = font_size * PADDING_RATIO;
        let (text_w, text_h) = text_size(scale, &self.font, &self.text);

        // right/bottom aligned against the padded corner
        let x = (width as f32 - padding - text_w as f32).round() as i32;
        let y = (height as f32 - padding - text_h as f32).round() as i32;

        let mut mask = GrayImage::new(width, height);
        draw_text_mut(&mut mask, Luma([255u8]), x, y, scale, &self.font, &self.text);

        let shadow = gaussian_blur_f32(&mask, SHADOW_SIGMA);
        blend_mask(canvas, &shadow, SHADOW_OFFSET, [0, 0, 0], SHADOW_OPACITY);
        blend_mask(canvas, &mask, (0, 0), [255, 255, 255], TEXT_OPACITY);
    }
}

/// Font size in pixels for an image `width` pixels wide.
pub fn font_size_for(width: u32) -> f32 {
    (width as f32 * FONT_SIZE_RATIO).max(MIN_FONT_SIZE)
}

/// Source-over composites `color` through `mask` (shifted by `offset`) at `opacity`.
fn blend_mask(
    canvas: &mut RgbaImage,
    mask: &GrayImage,
    offset: (i64, i64),
    color: [u8; 3],
    opacity: f32,
) {
    let (width, height) = canvas.dimensions();
    for (mx, my, coverage) in mask.enumerate_pixels() {
        if coverage[0] == 0 {
            continue;
        }
        let cx = i64::from(mx) + offset.0;
        let cy = i64::from(my) + offset.1;
        if cx < 0 || cy < 0 || cx >= i64::from(width) || cy >= i64::from(height) {
            continue;
        }
        let alpha = f32::from(coverage[0]) / 255.0 * opacity;
        let pixel = canvas.get_pixel_mut(cx as u32, cy as u32);
        let dst_alpha = f32::from(pixel[3]) / 255.0;
        let out_alpha = alpha + dst_alpha * (1.0 - alpha);
        if out_alpha <= f32::EPSILON {
            continue;
        }
        for channel in 0..3 {
            let src = f32::from(color[channel]) * alpha;
            let dst = f32::from(pixel[channel]) * dst_alpha * (1.0 - alpha);
            pixel[channel] = ((src + dst) / out_alpha).round().clamp(0.0, 255.0) as u8;
        }
        pixel[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .expect("encode png");
        buf.into_inner()
    }

    #[test]
    fn font_size_scales_with_a_floor() {
        assert_eq!(font_size_for(100), 16.0);
        assert!((font_size_for(2000) - 50.0).abs() < 1e-3);
    }

    #[test]
    fn stamps_bottom_right_only() {
        let marker = Watermarker::bundled("KYLE NGUYEN").expect("bundled font");
        let source = solid_png(800, 600, [20, 40, 160, 255]);
        let output = marker.apply(&source).expect("watermark");

        let stamped = image::load_from_memory_with_format(&output, ImageFormat::Png)
            .expect("output is png")
            .to_rgba8();
        assert_eq!(stamped.dimensions(), (800, 600));

        // top-left quadrant untouched
        for y in 0..300 {
            for x in 0..400 {
                assert_eq!(stamped.get_pixel(x, y), &Rgba([20, 40, 160, 255]));
            }
        }

        // something lighter was drawn in the bottom-right corner
        let brightened = stamped
            .enumerate_pixels()
            .filter(|(x, y, _)| *x > 500 && *y > 500)
            .any(|(_, _, pixel)| pixel[0] > 100 && pixel[1] > 100);
        assert!(brightened, "expected watermark text in the corner");

        // padding keeps the last rows and columns clean
        for x in 0..800 {
            assert_eq!(stamped.get_pixel(x, 599), &Rgba([20, 40, 160, 255]));
        }
    }

    #[test]
    fn shadow_is_faint_on_white() {
        let marker = Watermarker::bundled("KYLE NGUYEN").expect("bundled font");
        let mut canvas = RgbaImage::from_pixel(800, 600, Rgba([255, 255, 255, 255]));
        marker.stamp(&mut canvas);

        let darkest = canvas
            .pixels()
            .map(|pixel| pixel[0].min(pixel[1]).min(pixel[2]))
            .min()
            .unwrap_or(255);
        // 30% black at full coverage leaves about 178
        assert!(darkest < 250, "expected a visible shadow");
        assert!(darkest >= 175, "shadow too dark: {darkest}");
    }

    #[test]
    fn accepts_jpeg_input() {
        let img = image::RgbImage::from_pixel(64, 64, image::Rgb([200, 10, 10]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Jpeg)
            .expect("encode jpeg");
        let marker = Watermarker::bundled("KN").expect("bundled font");
        let output = marker.apply(&buf.into_inner()).expect("watermark");
        assert_eq!(image::guess_format(&output).expect("format"), ImageFormat::Png);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let marker = Watermarker::bundled("KN").expect("bundled font");
        assert!(matches!(
            marker.apply(b"definitely not an image"),
            Err(WatermarkError::Decode(_))
        ));
    }

    #[test]
    fn custom_font_file_loads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("font.ttf");
        std::fs::write(&path, BUNDLED_FONT).expect("write font");
        let marker = Watermarker::from_options(&WatermarkOptions {
            watermark_text: "STUDIO".to_string(),
            watermark_font: Some(path),
        })
        .expect("load font");
        assert_eq!(marker.text(), "STUDIO");

        let bad = dir.path().join("bad.ttf");
        std::fs::write(&bad, b"nope").expect("write bad font");
        assert!(matches!(
            Watermarker::from_options(&WatermarkOptions {
                watermark_text: "STUDIO".to_string(),
                watermark_font: Some(bad),
            }),
            Err(WatermarkError::Font(_))
        ));
    }
}
