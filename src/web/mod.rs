//! HTTP surface: the studio page, uploads, composition and the result image.

use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::StudioConfig;
use crate::constants::WORKSPACE_SWEEP_INTERVAL_SECONDS;
use crate::gemini::{GeminiClient, GeminiError};
use crate::watermark::Watermarker;
use crate::workspace::WorkspaceStore;

mod compose;
mod csrf;
mod flash;
mod images;
mod middleware;
mod prelude;
mod upload;
mod views;

use compose::{compose_handler, download_handler, result_handler};
use prelude::*;
use upload::{remove_image_handler, upload_handler, uploaded_image_handler};
use views::root_handler;

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    pub(crate) gemini: GeminiClient,
    pub(crate) watermark: Watermarker,
    pub(crate) workspaces: WorkspaceStore,
    session_idle: Duration,
    max_upload_bytes: usize,
    secure_cookies: bool,
}

impl AppState {
    fn from_config(config: StudioConfig) -> Result<Self, GeminiError> {
        Ok(Self {
            gemini: GeminiClient::new(config.gemini)?,
            watermark: config.watermark,
            workspaces: WorkspaceStore::new(),
            session_idle: config.session_idle,
            max_upload_bytes: config.max_upload_bytes,
            secure_cookies: config.secure_cookies,
        })
    }
}

fn create_router(state: AppState) -> Router {
    let idle_seconds = i64::try_from(state.session_idle.as_secs()).unwrap_or(i64::MAX);
    let sessions = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.secure_cookies)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(idle_seconds)));

    Router::new()
        .route("/", get(root_handler))
        .route("/static/styles.css", get(styles_handler))
        .route("/healthz", get(healthz_handler))
        .route("/upload", post(upload_handler))
        .route("/images/{id}", get(uploaded_image_handler))
        .route("/images/{id}/remove", post(remove_image_handler))
        .route("/compose", post(compose_handler))
        .route("/result", get(result_handler))
        .route("/result/download", get(download_handler))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(sessions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Drops workspaces nobody has touched within the session window.
async fn sweep_workspaces(workspaces: WorkspaceStore, idle: Duration) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(WORKSPACE_SWEEP_INTERVAL_SECONDS));
    loop {
        interval.tick().await;
        let pruned = workspaces.prune_idle(idle).await;
        if pruned > 0 {
            debug!("Pruned {} idle workspaces", pruned);
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Binds the listener and serves the studio until interrupted.
pub async fn setup_server(config: StudioConfig) -> Result<(), anyhow::Error> {
    let addr = format!("{}:{}", config.listen_address, config.port);
    let state = AppState::from_config(config)?;

    tokio::spawn(sweep_workspaces(
        state.workspaces.clone(),
        state.session_idle,
    ));

    let app = create_router(state);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}
