//! Client for the two Gemini `generateContent` calls: face clarity scoring and image synthesis.

use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::cli::GeminiOptions;
use crate::constants::CLARITY_INSTRUCTION;
use crate::prompt::{AspectRatio, synthesis_instruction};

const GEMINI_MAX_ATTEMPTS: usize = 2;
const GEMINI_RETRY_BASE_DELAY: Duration = Duration::from_millis(900);
const ERROR_BODY_LOG_LIMIT: usize = 512;

/// Connection settings for the Generative Language API.
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// API key, sent as `x-goog-api-key`
    pub api_key: String,
    /// API root, always ending in `/`
    pub base_url: Url,
    /// Model used by [`GeminiClient::check_face_clarity`]
    pub clarity_model: String,
    /// Model used by [`GeminiClient::generate_merged_image`]
    pub image_model: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Delay before the retry of a transient failure, scaled by attempt
    pub retry_delay: Duration,
}

impl GeminiConfig {
    /// Builds a config from CLI options, validating the base URL.
    pub fn from_options(options: &GeminiOptions) -> Result<Self, GeminiError> {
        Ok(Self {
            api_key: options.gemini_api_key.trim().to_string(),
            base_url: parse_base_url(&options.gemini_base_url)?,
            clarity_model: options.clarity_model.clone(),
            image_model: options.image_model.clone(),
            timeout: Duration::from_secs(options.gemini_timeout_secs.max(1)),
            retry_delay: GEMINI_RETRY_BASE_DELAY,
        })
    }
}

/// Parses an API root, appending the trailing slash that relative joins need.
pub fn parse_base_url(raw: &str) -> Result<Url, GeminiError> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(GeminiError::InvalidBaseUrl)
}

/// Errors from talking to the model API.
#[derive(Debug)]
pub enum GeminiError {
    /// The configured base URL, or a model endpoint built from it, is not a valid URL.
    InvalidBaseUrl(url::ParseError),
    /// The HTTP client could not be constructed.
    Client(reqwest::Error),
    /// The request never produced a response.
    Transport(reqwest::Error),
    /// The API answered with a non-success status.
    Status {
        /// HTTP status returned
        status: StatusCode,
        /// Response body, truncated
        body: String,
    },
    /// The response did not have the expected shape.
    Decode(String),
    /// The prompt was refused.
    Blocked(String),
    /// The model answered without an image part.
    NoImage,
    /// The image part was not valid base64.
    InvalidImageData(base64::DecodeError),
}

impl std::fmt::Display for GeminiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBaseUrl(err) => write!(f, "Invalid Gemini URL: {err}"),
            Self::Client(err) => write!(f, "Failed to build HTTP client: {err}"),
            Self::Transport(err) => write!(f, "Gemini request failed: {err}"),
            Self::Status { status, body } => write!(f, "Gemini API error {status}: {body}"),
            Self::Decode(message) => write!(f, "Unexpected Gemini response: {message}"),
            Self::Blocked(reason) => write!(f, "Gemini refused the request: {reason}"),
            Self::NoImage => write!(
                f,
                "The model returned no image, the request may have been refused"
            ),
            Self::InvalidImageData(err) => write!(f, "Image payload is not valid base64: {err}"),
        }
    }
}

impl std::error::Error for GeminiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidBaseUrl(err) => Some(err),
            Self::Client(err) | Self::Transport(err) => Some(err),
            Self::InvalidImageData(err) => Some(err),
            _ => None,
        }
    }
}

/// Verdict on whether an upload is a usable face reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarityCheck {
    /// 0-100, higher is clearer
    pub score: u8,
    /// Short explanation, in Vietnamese
    pub feedback: String,
    /// The model's own usability verdict
    #[serde(rename = "isUsable")]
    pub is_usable: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClarity {
    score: f64,
    feedback: String,
    is_usable: bool,
}

impl From<RawClarity> for ClarityCheck {
    fn from(raw: RawClarity) -> Self {
        let score = if raw.score.is_finite() {
            raw.score.round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        Self {
            score,
            feedback: raw.feedback.trim().to_string(),
            is_usable: raw.is_usable,
        }
    }
}

// -----------------------------
// Wire types
// -----------------------------

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum RequestPart<'a> {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: RequestInlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RequestInlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<ResponseInlineData>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize, Debug)]
struct ResponseInlineData {
    data: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn first_candidate_parts(&self) -> &[ResponsePart] {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.as_slice())
            .unwrap_or_default()
    }

    fn refusal_reason(&self) -> Option<String> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.clone())
        {
            return Some(reason);
        }
        self.candidates
            .first()
            .and_then(|candidate| candidate.finish_reason.as_deref())
            .filter(|reason| *reason != "STOP")
            .map(str::to_string)
    }

    fn text(&self) -> String {
        self.first_candidate_parts()
            .iter()
            .filter(|part| !part.thought)
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    fn first_image(&self) -> Option<&str> {
        self.first_candidate_parts()
            .iter()
            .filter_map(|part| part.inline_data.as_ref())
            .map(|inline| inline.data.as_str())
            .find(|data| !data.is_empty())
    }
}

fn clarity_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "score": {"type": "INTEGER", "description": "Clarity score from 0 to 100."},
            "feedback": {"type": "STRING", "description": "Brief feedback on face clarity in Vietnamese."},
            "isUsable": {"type": "BOOLEAN", "description": "Whether the image is suitable."}
        },
        "required": ["score", "feedback", "isUsable"]
    })
}

/// Strips a surrounding markdown code fence, if the model added one.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn truncate_body(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    match text.char_indices().nth(ERROR_BODY_LOG_LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

// -----------------------------
// Client
// -----------------------------

/// Shared, cloneable Gemini client.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Creates a client with the configured timeout.
    pub fn new(config: GeminiConfig) -> Result<Self, GeminiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GeminiError::Client)?;
        Ok(Self { http, config })
    }

    /// The settings in use.
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Scores how usable the face in `image` is as a generation reference.
    pub async fn check_face_clarity(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ClarityCheck, GeminiError> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::InlineData {
                        inline_data: RequestInlineData {
                            mime_type,
                            data: general_purpose::STANDARD.encode(image),
                        },
                    },
                    RequestPart::Text {
                        text: CLARITY_INSTRUCTION,
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: Some("application/json"),
                response_schema: Some(clarity_schema()),
                ..Default::default()
            },
        };

        let started = Instant::now();
        let response = self
            .generate_content(&self.config.clarity_model, &request)
            .await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(match response.refusal_reason() {
                Some(reason) => GeminiError::Blocked(reason),
                None => GeminiError::Decode("clarity response had no text".to_string()),
            });
        }
        let raw: RawClarity = serde_json::from_str(strip_code_fence(&text))
            .map_err(|err| GeminiError::Decode(format!("clarity JSON: {err}: {text}")))?;
        let clarity = ClarityCheck::from(raw);
        info!(
            "Clarity check scored {} in {:?}",
            clarity.score,
            started.elapsed()
        );
        Ok(clarity)
    }

    /// Renders a new image from the reference face and `prompt`, returning the decoded image bytes.
    pub async fn generate_merged_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Vec<u8>, GeminiError> {
        let instruction = synthesis_instruction(prompt, aspect_ratio);
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::InlineData {
                        inline_data: RequestInlineData {
                            mime_type,
                            data: general_purpose::STANDARD.encode(image),
                        },
                    },
                    RequestPart::Text { text: &instruction },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: Some(vec!["IMAGE", "TEXT"]),
                ..Default::default()
            },
        };

        let started = Instant::now();
        let response = self
            .generate_content(&self.config.image_model, &request)
            .await?;
        let Some(data) = response.first_image() else {
            if let Some(reason) = response.refusal_reason() {
                return Err(GeminiError::Blocked(reason));
            }
            let text = response.text();
            if !text.is_empty() {
                debug!("Image model answered with text only: {}", text);
            }
            return Err(GeminiError::NoImage);
        };
        let bytes = general_purpose::STANDARD
            .decode(data.trim())
            .map_err(GeminiError::InvalidImageData)?;
        info!(
            "Merged image generated ({} bytes) in {:?}",
            bytes.len(),
            started.elapsed()
        );
        Ok(bytes)
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let url = self
            .config
            .base_url
            .join(&format!("models/{model}:generateContent"))
            .map_err(GeminiError::InvalidBaseUrl)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("POST {} (attempt {})", url, attempt);
            let result = self
                .http
                .post(url.clone())
                .header("x-goog-api-key", &self.config.api_key)
                .json(request)
                .send()
                .await;

            let resp = match result {
                Ok(resp) => resp,
                Err(err) if attempt < GEMINI_MAX_ATTEMPTS && should_retry_error(&err) => {
                    warn!("Gemini request to {} failed, retrying: {}", model, err);
                    tokio::time::sleep(self.config.retry_delay * attempt as u32).await;
                    continue;
                }
                Err(err) => return Err(GeminiError::Transport(err)),
            };

            let status = resp.status();
            let bytes = resp.bytes().await.map_err(GeminiError::Transport)?;
            if !status.is_success() {
                if attempt < GEMINI_MAX_ATTEMPTS && should_retry_status(status) {
                    warn!("Gemini {} returned {}, retrying", model, status);
                    tokio::time::sleep(self.config.retry_delay * attempt as u32).await;
                    continue;
                }
                return Err(GeminiError::Status {
                    status,
                    body: truncate_body(&bytes),
                });
            }

            return serde_json::from_slice(&bytes)
                .map_err(|err| GeminiError::Decode(format!("{err}: {}", truncate_body(&bytes))));
        }
    }
}
