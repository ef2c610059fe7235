//! Turns uploaded files into scored reference images.

use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::RngExt;
use rand::distr::Alphanumeric;
use tracing::{debug, info, warn};

use crate::constants::{CLARITY_GOOD_THRESHOLD, CLARITY_USABLE_THRESHOLD};
use crate::gemini::{ClarityCheck, GeminiClient};

/// A file as received from the browser, before any checks.
#[derive(Clone, Debug)]
pub struct IncomingFile {
    /// Client-side file name
    pub file_name: String,
    /// Raw bytes
    pub bytes: Vec<u8>,
}

/// Why a file was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeError {
    /// Nothing was uploaded in this slot
    Empty,
    /// Not PNG, JPEG or WEBP
    UnsupportedFormat,
    /// Looked like an image but did not decode
    Corrupt,
}

impl std::fmt::Display for IntakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty file"),
            Self::UnsupportedFormat => write!(f, "unsupported image format"),
            Self::Corrupt => write!(f, "image could not be decoded"),
        }
    }
}

impl std::error::Error for IntakeError {}

/// Format facts learnt from the bytes themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectedImage {
    /// MIME type derived from the sniffed format
    pub mime_type: &'static str,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
}

/// Sniffs and decodes `bytes`, accepting PNG, JPEG and WEBP only.
pub fn inspect_image(bytes: &[u8]) -> Result<InspectedImage, IntakeError> {
    if bytes.is_empty() {
        return Err(IntakeError::Empty);
    }
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| {
            debug!("Failed to guess image format: {}", err);
            IntakeError::UnsupportedFormat
        })?;
    let mime_type = match reader.format() {
        Some(image::ImageFormat::Png) => "image/png",
        Some(image::ImageFormat::Jpeg) => "image/jpeg",
        Some(image::ImageFormat::WebP) => "image/webp",
        other => {
            debug!("Rejected upload with format {:?}", other);
            return Err(IntakeError::UnsupportedFormat);
        }
    };
    let (width, height) = reader.into_dimensions().map_err(|err| {
        debug!("Failed to read image dimensions: {}", err);
        IntakeError::Corrupt
    })?;
    Ok(InspectedImage {
        mime_type,
        width,
        height,
    })
}

/// A reference image held in a visitor's workspace.
#[derive(Clone, Debug)]
pub struct UploadedImage {
    /// `<unix-ms>-<random>`, safe in URLs
    pub id: String,
    /// Client-side file name, for display
    pub file_name: String,
    /// Sniffed MIME type
    pub mime_type: &'static str,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
    /// Original bytes, shared with in-flight requests
    pub bytes: Arc<[u8]>,
    /// Verdict from the clarity model; `None` until scored
    pub clarity: Option<ClarityCheck>,
    /// When the upload was accepted
    pub uploaded_at: DateTime<Utc>,
}

impl UploadedImage {
    /// Builds an unscored image from inspected bytes.
    pub fn new(file_name: &str, bytes: Vec<u8>, inspected: &InspectedImage) -> Self {
        Self {
            id: new_image_id(),
            file_name: display_name(file_name),
            mime_type: inspected.mime_type,
            width: inspected.width,
            height: inspected.height,
            bytes: Arc::from(bytes),
            clarity: None,
            uploaded_at: Utc::now(),
        }
    }

    /// True when a verdict exists and scores below the usable threshold.
    pub fn is_low_clarity(&self) -> bool {
        self.clarity
            .as_ref()
            .is_some_and(|clarity| clarity.score < CLARITY_USABLE_THRESHOLD)
    }
}

/// Display band for a clarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarityBand {
    /// 75 and up
    Good,
    /// 50 to 74
    Fair,
    /// Under 50
    Poor,
}

impl ClarityBand {
    /// Band for `score`.
    pub fn for_score(score: u8) -> Self {
        if score >= CLARITY_GOOD_THRESHOLD {
            ClarityBand::Good
        } else if score >= CLARITY_USABLE_THRESHOLD {
            ClarityBand::Fair
        } else {
            ClarityBand::Poor
        }
    }

    /// CSS class used by the template.
    pub fn css_class(self) -> &'static str {
        match self {
            ClarityBand::Good => "clarity-good",
            ClarityBand::Fair => "clarity-fair",
            ClarityBand::Poor => "clarity-poor",
        }
    }
}

fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn new_image_id() -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), random_suffix(8))
}

fn display_name(file_name: &str) -> String {
    // browsers on some platforms send the full client path
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    if base.is_empty() {
        "image".to_string()
    } else {
        base.to_string()
    }
}

/// What happened to a batch of uploads.
#[derive(Debug, Default)]
pub struct IntakeReport {
    /// Images that passed inspection and were scored
    pub accepted: Vec<UploadedImage>,
    /// Files rejected before scoring
    pub rejected: usize,
    /// Files whose clarity call failed; they are not kept
    pub analysis_failed: usize,
}

/// Inspects each file and scores the valid ones, one after another.
pub async fn score_uploads(client: &GeminiClient, files: Vec<IncomingFile>) -> IntakeReport {
    let mut report = IntakeReport::default();
    for file in files {
        let inspected = match inspect_image(&file.bytes) {
            Ok(inspected) => inspected,
            Err(IntakeError::Empty) => continue,
            Err(err) => {
                info!("Rejected upload {:?}: {}", file.file_name, err);
                report.rejected += 1;
                continue;
            }
        };
        let mut image = UploadedImage::new(&file.file_name, file.bytes, &inspected);
        match client
            .check_face_clarity(&image.bytes, image.mime_type)
            .await
        {
            Ok(clarity) => {
                image.clarity = Some(clarity);
                report.accepted.push(image);
            }
            Err(err) => {
                warn!("Clarity check failed for {:?}: {}", image.file_name, err);
                report.analysis_failed += 1;
            }
        }
    }
    report
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gemini::tests::{FakeGemini, spawn_fake, text_response};
    use image::{DynamicImage, ImageFormat, RgbImage};

    pub(crate) fn encoded(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([120, 90, 60]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, format)
            .expect("encode test image");
        buf.into_inner()
    }

    #[test]
    fn inspects_supported_formats() {
        let png = inspect_image(&encoded(ImageFormat::Png, 12, 8)).expect("png");
        assert_eq!(png.mime_type, "image/png");
        assert_eq!((png.width, png.height), (12, 8));
        let jpeg = inspect_image(&encoded(ImageFormat::Jpeg, 4, 4)).expect("jpeg");
        assert_eq!(jpeg.mime_type, "image/jpeg");
    }

    #[test]
    fn rejects_other_inputs() {
        assert_eq!(inspect_image(&[]), Err(IntakeError::Empty));
        assert_eq!(
            inspect_image(b"This is not an image."),
            Err(IntakeError::UnsupportedFormat)
        );
        // PNG signature with nothing behind it
        assert_eq!(
            inspect_image(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            Err(IntakeError::Corrupt)
        );
    }

    #[test]
    fn bands_follow_thresholds() {
        assert_eq!(ClarityBand::for_score(75), ClarityBand::Good);
        assert_eq!(ClarityBand::for_score(74), ClarityBand::Fair);
        assert_eq!(ClarityBand::for_score(50), ClarityBand::Fair);
        assert_eq!(ClarityBand::for_score(49), ClarityBand::Poor);
    }

    #[test]
    fn client_paths_are_trimmed() {
        assert_eq!(display_name("C:\\Users\\me\\face.jpg"), "face.jpg");
        assert_eq!(display_name("/tmp/face.png"), "face.png");
        assert_eq!(display_name("  "), "image");
    }

    #[test]
    fn ids_are_unique_and_url_safe() {
        let a = new_image_id();
        let b = new_image_id();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[tokio::test]
    async fn scores_valid_files_and_skips_the_rest() {
        let fake = FakeGemini::new(
            text_response(r#"{"score": 77, "feedback": "Rõ", "isUsable": true}"#),
            serde_json::json!({}),
        );
        let client = GeminiClient::new(spawn_fake(fake).await).expect("client");
        let report = score_uploads(
            &client,
            vec![
                IncomingFile {
                    file_name: "face.png".to_string(),
                    bytes: encoded(ImageFormat::Png, 16, 16),
                },
                IncomingFile {
                    file_name: "notes.txt".to_string(),
                    bytes: b"hello".to_vec(),
                },
                IncomingFile {
                    file_name: String::new(),
                    bytes: Vec::new(),
                },
            ],
        )
        .await;
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.analysis_failed, 0);
        let image = &report.accepted[0];
        assert_eq!(image.file_name, "face.png");
        assert_eq!(image.clarity.as_ref().map(|c| c.score), Some(77));
        assert!(!image.is_low_clarity());
    }

    #[tokio::test]
    async fn failed_analysis_drops_the_image() {
        let fake = FakeGemini::new(text_response("not json at all"), serde_json::json!({}));
        let client = GeminiClient::new(spawn_fake(fake).await).expect("client");
        let report = score_uploads(
            &client,
            vec![IncomingFile {
                file_name: "face.png".to_string(),
                bytes: encoded(ImageFormat::Png, 16, 16),
            }],
        )
        .await;
        assert!(report.accepted.is_empty());
        assert_eq!(report.analysis_failed, 1);
    }

    #[tokio::test]
    async fn one_failed_analysis_keeps_the_others() {
        let good = text_response(r#"{"score": 90, "feedback": "Rõ", "isUsable": true}"#);
        let mut fake = FakeGemini::new(good.clone(), serde_json::json!({}));
        fake.clarity_sequence = vec![good.clone(), text_response("not json at all"), good];
        let clarity_calls = fake.clarity_calls.clone();
        let client = GeminiClient::new(spawn_fake(fake).await).expect("client");
        let files = ["first.png", "second.png", "third.png"]
            .into_iter()
            .map(|name| IncomingFile {
                file_name: name.to_string(),
                bytes: encoded(ImageFormat::Png, 16, 16),
            })
            .collect();
        let report = score_uploads(&client, files).await;

        assert_eq!(report.analysis_failed, 1);
        assert_eq!(report.rejected, 0);
        let names: Vec<&str> = report
            .accepted
            .iter()
            .map(|image| image.file_name.as_str())
            .collect();
        assert_eq!(names, ["first.png", "third.png"]);
        assert_eq!(clarity_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
