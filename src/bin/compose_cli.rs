use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use faceswap_studio::cli::{GeminiOptions, WatermarkOptions};
use faceswap_studio::config::setup_logging;
use faceswap_studio::constants::CLARITY_USABLE_THRESHOLD;
use faceswap_studio::gemini::{GeminiClient, GeminiConfig};
use faceswap_studio::intake::inspect_image;
use faceswap_studio::prompt::{AspectRatio, Category, PromptSelections};
use faceswap_studio::watermark::Watermarker;

/// Merge a portrait into a described scene without the web UI.
///
///   compose_cli face.jpg --style "Kiệt tác sơn dầu" --ratio 3:4 -o out.png
#[derive(Parser, Debug)]
#[command(name = "compose_cli")]
#[command(about = "Score a portrait, assemble the prompt and write a watermarked composite")]
struct Args {
    /// Portrait to use as the face reference (PNG, JPG or WEBP)
    image: PathBuf,

    /// Style tag, repeatable
    #[arg(long)]
    style: Vec<String>,
    /// Free-text style description
    #[arg(long)]
    style_text: Option<String>,

    /// Background tag, repeatable
    #[arg(long)]
    background: Vec<String>,
    /// Free-text background description
    #[arg(long)]
    background_text: Option<String>,

    /// Camera angle tag, repeatable
    #[arg(long)]
    camera_angle: Vec<String>,
    /// Free-text camera angle description
    #[arg(long)]
    camera_angle_text: Option<String>,

    /// Lighting tag, repeatable
    #[arg(long)]
    lighting: Vec<String>,
    /// Free-text lighting description
    #[arg(long)]
    lighting_text: Option<String>,

    /// One of 1:1, 16:9, 9:16, 4:3, 3:4
    #[arg(long, default_value = "1:1", value_parser = parse_ratio)]
    ratio: AspectRatio,

    /// Where the watermarked PNG is written
    #[arg(long, short, default_value = "faceswap-result.png")]
    output: PathBuf,

    /// Generate even when the face scores below the clarity threshold
    #[arg(long)]
    allow_low_clarity: bool,

    /// Replace `--output` if it already exists
    #[arg(long)]
    overwrite: bool,

    /// Don't call the clarity model at all
    #[arg(long)]
    skip_clarity: bool,

    /// Enable debug logging
    #[arg(long, env = "FACESWAP_DEBUG")]
    debug: bool,

    #[command(flatten)]
    gemini: GeminiOptions,

    #[command(flatten)]
    watermark: WatermarkOptions,
}

fn parse_ratio(raw: &str) -> Result<AspectRatio, String> {
    raw.parse::<AspectRatio>().map_err(|_| {
        let known: Vec<&str> = AspectRatio::ALL.iter().map(|ratio| ratio.value()).collect();
        format!("unknown aspect ratio {raw:?}, expected one of {}", known.join(", "))
    })
}

impl Args {
    /// Tags must be one of the category's suggestions; free text goes in the `*_text` flags.
    fn selections(&self) -> Result<PromptSelections> {
        let mut selections = PromptSelections::default();
        for (category, tags, text) in [
            (Category::Style, &self.style, &self.style_text),
            (Category::Background, &self.background, &self.background_text),
            (Category::CameraAngle, &self.camera_angle, &self.camera_angle_text),
            (Category::Lighting, &self.lighting, &self.lighting_text),
        ] {
            if let Some(tag) = tags.iter().find(|tag| !category.is_suggestion(tag)) {
                bail!(
                    "{tag:?} is not a {category} suggestion, expected one of: {}",
                    category.suggestions().join(", ")
                );
            }
            let selection = selections.get_mut(category);
            selection.set_selected(tags.iter().map(String::as_str));
            if let Some(text) = text {
                selection.set_custom(text);
            }
        }
        Ok(selections)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.debug).map_err(|err| anyhow!("Failed to set up logging: {err}"))?;

    if args.output.exists() && !args.overwrite {
        bail!(
            "{} already exists, pass --overwrite to replace it",
            args.output.display()
        );
    }

    let prompt = args
        .selections()?
        .assemble()
        .ok_or_else(|| anyhow!("Describe at least one of style, background, camera angle or lighting"))?;

    let bytes = fs::read(&args.image)
        .with_context(|| format!("Failed to read {}", args.image.display()))?;
    let inspected = inspect_image(&bytes)
        .with_context(|| format!("Can't use {}", args.image.display()))?;
    eprintln!(
        "Loaded {} ({}, {}x{})",
        args.image.display(),
        inspected.mime_type,
        inspected.width,
        inspected.height
    );

    let config = GeminiConfig::from_options(&args.gemini).context("Invalid Gemini configuration")?;
    let client = GeminiClient::new(config).context("Failed to build the HTTP client")?;
    let watermark =
        Watermarker::from_options(&args.watermark).context("Failed to load the watermark font")?;

    if !args.skip_clarity {
        let clarity = client
            .check_face_clarity(&bytes, inspected.mime_type)
            .await
            .context("Face clarity check failed")?;
        eprintln!("Clarity {}%: {}", clarity.score, clarity.feedback);
        if clarity.score < CLARITY_USABLE_THRESHOLD {
            if !args.allow_low_clarity {
                bail!(
                    "Face clarity {}% is below {}%, use a sharper photo or pass --allow-low-clarity",
                    clarity.score,
                    CLARITY_USABLE_THRESHOLD
                );
            }
            eprintln!("Continuing despite low clarity (--allow-low-clarity)");
        }
    }

    eprintln!("Prompt: {prompt}");
    eprintln!("Aspect ratio: {}", args.ratio.value());
    let raw = client
        .generate_merged_image(&bytes, inspected.mime_type, &prompt, args.ratio)
        .await
        .context("Image generation failed")?;
    let png = watermark.apply(&raw).context("Failed to watermark the result")?;

    fs::write(&args.output, &png)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("{}", args.output.display());
    Ok(())
}
