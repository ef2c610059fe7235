use super::csrf::validate_csrf;
use super::flash;
use super::images::{ImageCacheHeaders, image_response, is_not_modified, not_modified_response};
use super::prelude::*;
use crate::constants::UPLOAD_CACHE_CONTROL;
use crate::intake::{IncomingFile, score_uploads};
use axum::extract::Multipart;
use axum::http::HeaderMap;
use tracing::instrument;

#[derive(Deserialize)]
pub(crate) struct CsrfForm {
    csrf_token: String,
}

/// Accepts one or more files, scores each with the clarity model and keeps the ones that scored.
///
/// The CSRF token has to come before any file; files beyond the workspace's
/// remaining capacity are skipped unread.
#[instrument(skip_all, fields(workspace = %studio.workspace_id))]
pub(crate) async fn upload_handler(
    State(state): State<AppState>,
    studio: StudioSession,
    mut multipart: Multipart,
) -> Result<Redirect, StudioError> {
    let mut csrf_checked = false;
    let mut capacity = 0usize;
    let mut over_limit = false;
    let mut files: Vec<IncomingFile> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "csrf_token" => {
                let csrf_token_value = field.text().await?;
                validate_csrf(&studio.session, &csrf_token_value).await?;
                csrf_checked = true;
                capacity = state
                    .workspaces
                    .update(&studio.workspace_id, |workspace| {
                        workspace.remaining_capacity()
                    })
                    .await;
            }
            "images" => {
                if !csrf_checked {
                    info!("Upload sent files ahead of its CSRF token");
                    return Err(StudioError::Unauthorized);
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                if file_name.is_empty() {
                    continue;
                }
                if files.len() >= capacity {
                    over_limit = true;
                    continue;
                }
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                files.push(IncomingFile {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            other => {
                debug!("Ignoring upload field {:?}", other);
            }
        }
    }

    if !csrf_checked {
        return Err(StudioError::Unauthorized);
    }

    if files.is_empty() {
        let flag = if over_limit {
            flash::FLASH_TOO_MANY_IMAGES
        } else {
            flash::FLASH_NO_FILES
        };
        flash::set_flash(&studio.session, flag).await?;
        return Ok(Redirect::to("/"));
    }

    let received = files.len();
    let report = score_uploads(&state.gemini, files).await;
    info!(
        "Upload batch: {} received, {} accepted, {} rejected, {} failed analysis",
        received,
        report.accepted.len(),
        report.rejected,
        report.analysis_failed
    );

    let refused = state
        .workspaces
        .update(&studio.workspace_id, |workspace| {
            workspace.add_images(report.accepted)
        })
        .await;
    let turned_away = refused > 0 || over_limit;
    if turned_away {
        info!("Workspace full, turned away files from this batch");
    }

    if report.analysis_failed > 0 {
        flash::set_flash(&studio.session, flash::FLASH_ANALYSIS_FAILED).await?;
    } else if turned_away {
        flash::set_flash(&studio.session, flash::FLASH_TOO_MANY_IMAGES).await?;
    } else if report.rejected > 0 {
        flash::set_flash(&studio.session, flash::FLASH_UNSUPPORTED_UPLOAD).await?;
    }
    Ok(Redirect::to("/"))
}

/// Serves an uploaded image back for its thumbnail.
pub(crate) async fn uploaded_image_handler(
    State(state): State<AppState>,
    studio: StudioSession,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, StudioError> {
    let image = state
        .workspaces
        .update(&studio.workspace_id, |workspace| workspace.image(&id).cloned())
        .await
        .ok_or_else(|| StudioError::NotFound(format!("/images/{id}")))?;

    let cache_headers = ImageCacheHeaders::for_identity(&image.id, UPLOAD_CACHE_CONTROL);
    if is_not_modified(&headers, &cache_headers) {
        return not_modified_response(&cache_headers);
    }
    image_response(image.bytes.to_vec(), image.mime_type, &cache_headers, None)
}

/// Drops an uploaded image from the workspace.
pub(crate) async fn remove_image_handler(
    State(state): State<AppState>,
    studio: StudioSession,
    Path(id): Path<String>,
    Form(form): Form<CsrfForm>,
) -> Result<Redirect, StudioError> {
    validate_csrf(&studio.session, &form.csrf_token).await?;
    let removed = state
        .workspaces
        .update(&studio.workspace_id, |workspace| workspace.remove_image(&id))
        .await;
    if !removed {
        return Err(StudioError::NotFound(format!("/images/{id}")));
    }
    Ok(Redirect::to("/"))
}
