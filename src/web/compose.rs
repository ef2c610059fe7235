use std::sync::Arc;

use super::csrf::validate_csrf;
use super::flash;
use super::images::{ImageCacheHeaders, image_response};
use super::prelude::*;
use crate::constants::{RESULT_CACHE_CONTROL, RESULT_DOWNLOAD_NAME};
use crate::prompt::{AspectRatio, Category};
use crate::workspace::{GeneratedImage, GenerationRequest, Workspace};
use chrono::Utc;
use tracing::instrument;

/// What the compose form is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComposeAction {
    Save,
    Generate,
}

/// Parsed compose form. Built from raw pairs because tags repeat per category.
#[derive(Debug, Default)]
pub(crate) struct ComposeForm {
    csrf_token: String,
    selected_image: Option<String>,
    aspect_ratio: Option<String>,
    action: Option<String>,
    tags: Vec<(Category, String)>,
    custom: Vec<(Category, String)>,
}

impl ComposeForm {
    pub(crate) fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "csrf_token" => form.csrf_token = value,
                "selected_image" => form.selected_image = Some(value),
                "aspect_ratio" => form.aspect_ratio = Some(value),
                "action" => form.action = Some(value),
                other => {
                    if let Ok(category) = other.parse::<Category>() {
                        form.tags.push((category, value));
                    } else if let Some(category) = other
                        .strip_suffix("_custom")
                        .and_then(|key| key.parse::<Category>().ok())
                    {
                        form.custom.push((category, value));
                    } else {
                        debug!("Ignoring compose field {:?}", other);
                    }
                }
            }
        }
        form
    }

    fn action(&self) -> Result<ComposeAction, StudioError> {
        match self.action.as_deref() {
            None | Some("save") => Ok(ComposeAction::Save),
            Some("generate") => Ok(ComposeAction::Generate),
            Some(other) => {
                info!("Unknown compose action {:?}", other);
                Err(StudioError::BadRequest)
            }
        }
    }

    fn aspect_ratio(&self) -> Result<Option<AspectRatio>, StudioError> {
        match self.aspect_ratio.as_deref() {
            None => Ok(None),
            Some(value) => value
                .parse::<AspectRatio>()
                .map(Some)
                .map_err(|_| StudioError::BadRequest),
        }
    }

    /// Writes the submitted choices into `workspace`. Tags outside a category's suggestions are dropped.
    fn apply(&self, workspace: &mut Workspace, aspect_ratio: Option<AspectRatio>) {
        for category in Category::ALL {
            let tags = self
                .tags
                .iter()
                .filter(|(tag_category, _)| *tag_category == category)
                .map(|(_, tag)| tag.as_str())
                .filter(|tag| {
                    let known = category.is_suggestion(tag);
                    if !known {
                        debug!("Dropping unknown {} tag {:?}", category, tag);
                    }
                    known
                });
            let selection = workspace.selections.get_mut(category);
            selection.set_selected(tags);
            if let Some((_, custom)) = self
                .custom
                .iter()
                .rev()
                .find(|(custom_category, _)| *custom_category == category)
            {
                selection.set_custom(custom);
            }
        }

        if let Some(ratio) = aspect_ratio {
            workspace.aspect_ratio = ratio;
        }

        match self.selected_image.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => {
                if !workspace.select_image(id) {
                    debug!("Selected image {:?} is not in the workspace", id);
                    workspace.clear_selection();
                }
            }
            None => workspace.clear_selection(),
        }
    }
}

/// Saves the form and, when asked, runs synthesis and watermarking.
#[instrument(skip_all, fields(workspace = %studio.workspace_id))]
pub(crate) async fn compose_handler(
    State(state): State<AppState>,
    studio: StudioSession,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Redirect, StudioError> {
    let form = ComposeForm::from_pairs(pairs);
    validate_csrf(&studio.session, &form.csrf_token).await?;
    let action = form.action()?;
    let aspect_ratio = form.aspect_ratio()?;

    let outcome = state
        .workspaces
        .update(&studio.workspace_id, |workspace| {
            form.apply(workspace, aspect_ratio);
            match action {
                ComposeAction::Save => None,
                ComposeAction::Generate => Some(workspace.begin_generation()),
            }
        })
        .await;

    let request = match outcome {
        None => {
            flash::set_flash(&studio.session, flash::FLASH_SELECTIONS_SAVED).await?;
            return Ok(Redirect::to("/"));
        }
        Some(Err(blocked)) => {
            info!("Generation blocked: {:?}", blocked);
            flash::set_flash(&studio.session, flash::flag_for_blocked(blocked)).await?;
            return Ok(Redirect::to("/"));
        }
        Some(Ok(request)) => request,
    };

    // the run finishes and releases the workspace even if this request is dropped
    let task = tokio::spawn(run_generation(
        state.clone(),
        studio.workspace_id.clone(),
        request,
    ));
    let succeeded = match task.await {
        Ok(succeeded) => succeeded,
        Err(err) => {
            error!("Generation task failed: {}", err);
            state
                .workspaces
                .update(&studio.workspace_id, |workspace| {
                    workspace.finish_generation(None)
                })
                .await;
            false
        }
    };

    if !succeeded {
        flash::set_flash(&studio.session, flash::FLASH_GENERATION_FAILED).await?;
    }
    Ok(Redirect::to("/#result"))
}

/// Synthesis then watermark; always ends the workspace's run. Returns whether a result was stored.
async fn run_generation(state: AppState, workspace_id: String, request: GenerationRequest) -> bool {
    let result = generate_watermarked(&state, &workspace_id, &request).await;
    let generated = match result {
        Ok(png) => Some(GeneratedImage {
            png: Arc::from(png),
            prompt: request.prompt.clone(),
            created_at: Utc::now(),
        }),
        Err(err) => {
            error!("Image generation failed: {}", err);
            None
        }
    };
    let succeeded = generated.is_some();
    state
        .workspaces
        .update(&workspace_id, |workspace| workspace.finish_generation(generated))
        .await;
    succeeded
}

async fn generate_watermarked(
    state: &AppState,
    workspace_id: &str,
    request: &GenerationRequest,
) -> Result<Vec<u8>, StudioError> {
    let raw = state
        .gemini
        .generate_merged_image(
            &request.image,
            request.mime_type,
            &request.prompt,
            request.aspect_ratio,
        )
        .await?;
    state
        .workspaces
        .update(workspace_id, |workspace| workspace.mark_watermarking())
        .await;
    debug!("Watermarking {} bytes", raw.len());
    let watermark = state.watermark.clone();
    let png = tokio::task::spawn_blocking(move || watermark.apply(&raw))
        .await
        .map_err(|err| StudioError::InternalServerError(err.to_string()))??;
    Ok(png)
}

async fn current_result(
    state: &AppState,
    studio: &StudioSession,
) -> Result<GeneratedImage, StudioError> {
    state
        .workspaces
        .update(&studio.workspace_id, |workspace| workspace.generated().cloned())
        .await
        .ok_or_else(|| StudioError::NotFound("/result".to_string()))
}

/// The watermarked result, inline.
pub(crate) async fn result_handler(
    State(state): State<AppState>,
    studio: StudioSession,
) -> Result<Response, StudioError> {
    let generated = current_result(&state, &studio).await?;
    let identity = generated.created_at.timestamp_millis().to_string();
    let cache_headers = ImageCacheHeaders::for_identity(&identity, RESULT_CACHE_CONTROL);
    image_response(generated.png.to_vec(), "image/png", &cache_headers, None)
}

/// The watermarked result, as an attachment.
pub(crate) async fn download_handler(
    State(state): State<AppState>,
    studio: StudioSession,
) -> Result<Response, StudioError> {
    let generated = current_result(&state, &studio).await?;
    let identity = generated.created_at.timestamp_millis().to_string();
    let cache_headers = ImageCacheHeaders::for_identity(&identity, RESULT_CACHE_CONTROL);
    image_response(
        generated.png.to_vec(),
        "image/png",
        &cache_headers,
        Some(RESULT_DOWNLOAD_NAME),
    )
}
