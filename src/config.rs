//! Config handling

use std::num::NonZeroU16;
use std::time::Duration;

use anyhow::Context;
use tracing::log::LevelFilter;

use crate::cli::CliOptions;
use crate::gemini::GeminiConfig;
use crate::watermark::Watermarker;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("tower_sessions", LevelFilter::Warn)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Everything the server needs, resolved from the CLI/environment.
#[derive(Clone, Debug)]
pub struct StudioConfig {
    /// Address to bind to
    pub listen_address: String,
    /// Port to bind to
    pub port: NonZeroU16,
    /// Largest request body accepted, uploads included
    pub max_upload_bytes: usize,
    /// Inactivity window for sessions and their workspaces
    pub session_idle: Duration,
    /// Whether session cookies carry the `Secure` attribute
    pub secure_cookies: bool,
    /// Remote model settings
    pub gemini: GeminiConfig,
    /// Loaded watermark font and text
    pub watermark: Watermarker,
}

impl StudioConfig {
    /// Resolves the parsed CLI options, loading the watermark font and validating the API URL.
    pub fn from_cli(cli: &CliOptions) -> anyhow::Result<Self> {
        let gemini =
            GeminiConfig::from_options(&cli.gemini).context("Invalid Gemini configuration")?;
        let watermark = Watermarker::from_options(&cli.watermark)
            .context("Failed to load the watermark font")?;
        if cli.session_idle_minutes == 0 {
            anyhow::bail!("session idle minutes must be at least 1");
        }

        Ok(Self {
            listen_address: cli.listen_address.clone(),
            port: cli.port,
            max_upload_bytes: cli.max_upload_bytes,
            session_idle: Duration::from_secs(u64::from(cli.session_idle_minutes) * 60),
            secure_cookies: cli.secure_cookies,
            gemini,
            watermark,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_resolve() {
        let cli = CliOptions::try_parse_from(["faceswap-studio", "--gemini-api-key", "k"])
            .expect("parse cli");
        let config = StudioConfig::from_cli(&cli).expect("resolve config");
        assert_eq!(config.port.get(), 9000);
        assert_eq!(config.listen_address, "127.0.0.1");
        assert_eq!(config.session_idle, Duration::from_secs(3600));
        assert_eq!(config.gemini.clarity_model, "gemini-2.5-flash");
        assert_eq!(config.gemini.image_model, "gemini-2.5-flash-image-preview");
        assert_eq!(config.watermark.text(), "KYLE NGUYEN");
    }

    #[test]
    fn zero_idle_minutes_is_rejected() {
        let cli = CliOptions::try_parse_from([
            "faceswap-studio",
            "--gemini-api-key",
            "k",
            "--session-idle-minutes",
            "0",
        ])
        .expect("parse cli");
        assert!(StudioConfig::from_cli(&cli).is_err());
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.ttf");
        let cli = CliOptions::try_parse_from([
            "faceswap-studio",
            "--gemini-api-key",
            "k",
            "--watermark-font",
            missing.to_str().expect("utf8 path"),
        ])
        .expect("parse cli");
        assert!(StudioConfig::from_cli(&cli).is_err());
    }
}
