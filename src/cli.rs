//! CLI parser
use clap::{Args, Parser};
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CLARITY_MODEL, DEFAULT_GEMINI_BASE_URL, DEFAULT_IMAGE_MODEL, WATERMARK_TEXT,
};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "FACESWAP_DEBUG")]
    /// Enable debug logging. Env: FACESWAP_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "FACESWAP_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: FACESWAP_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "FACESWAP_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: FACESWAP_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, default_value = "20971520", env = "FACESWAP_MAX_UPLOAD_BYTES")]
    /// Largest accepted request body, defaults to 20 MiB.
    /// Env: FACESWAP_MAX_UPLOAD_BYTES
    pub max_upload_bytes: usize,

    #[clap(long, default_value = "60", env = "FACESWAP_SESSION_IDLE_MINUTES")]
    /// Minutes of inactivity before a visitor's workspace is dropped.
    /// Env: FACESWAP_SESSION_IDLE_MINUTES
    pub session_idle_minutes: u32,

    #[clap(long, env = "FACESWAP_SECURE_COOKIES")]
    /// Mark session cookies `Secure`; enable when served over HTTPS.
    /// Env: FACESWAP_SECURE_COOKIES
    pub secure_cookies: bool,

    #[command(flatten)]
    /// Remote model settings
    pub gemini: GeminiOptions,

    #[command(flatten)]
    /// Watermark settings
    pub watermark: WatermarkOptions,
}

/// Options for the Gemini API client, shared by the server and `compose_cli`.
#[derive(Args, Debug, Clone)]
pub struct GeminiOptions {
    /// Gemini API key. Env: GEMINI_API_KEY
    #[arg(required = true, long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: String,

    /// Base URL of the Generative Language API.
    #[arg(long, default_value = DEFAULT_GEMINI_BASE_URL, env = "FACESWAP_GEMINI_BASE_URL")]
    pub gemini_base_url: String,

    /// Model that scores face clarity
    #[arg(long, default_value = DEFAULT_CLARITY_MODEL, env = "FACESWAP_CLARITY_MODEL")]
    pub clarity_model: String,

    /// Model that renders the merged image
    #[arg(long, default_value = DEFAULT_IMAGE_MODEL, env = "FACESWAP_IMAGE_MODEL")]
    pub image_model: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "120", env = "FACESWAP_GEMINI_TIMEOUT_SECS")]
    pub gemini_timeout_secs: u64,
}

/// Watermark overrides
#[derive(Args, Debug, Clone)]
pub struct WatermarkOptions {
    /// Text stamped onto every generated image
    #[arg(long, default_value = WATERMARK_TEXT, env = "FACESWAP_WATERMARK_TEXT")]
    pub watermark_text: String,

    /// TrueType/OpenType font for the watermark, the bundled bold sans is used otherwise
    #[arg(long, env = "FACESWAP_WATERMARK_FONT")]
    pub watermark_font: Option<PathBuf>,
}
