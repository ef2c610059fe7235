//! Error handling

use axum::response::IntoResponse;
use tracing::info;

use crate::gemini::GeminiError;
use crate::watermark::WatermarkError;

/// Errors surfaced by the studio's HTTP handlers.
#[derive(Debug)]
pub enum StudioError {
    /// When you didn't do the right thing
    BadRequest,
    /// Missing or invalid session / CSRF token
    Unauthorized,
    /// When a requested resource is not found
    NotFound(String),
    /// Upstream model call failed
    Upstream(GeminiError),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl std::fmt::Display for StudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest => write!(f, "bad request"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Upstream(err) => write!(f, "upstream error: {err}"),
            Self::InternalServerError(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for StudioError {}

impl From<std::io::Error> for StudioError {
    fn from(err: std::io::Error) -> Self {
        StudioError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for StudioError {
    fn from(err: axum::http::Error) -> Self {
        StudioError::InternalServerError(err.to_string())
    }
}

impl From<tower_sessions::session::Error> for StudioError {
    fn from(err: tower_sessions::session::Error) -> Self {
        StudioError::InternalServerError(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for StudioError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        info!("Malformed multipart body: {}", err);
        StudioError::BadRequest
    }
}

impl From<GeminiError> for StudioError {
    fn from(err: GeminiError) -> Self {
        StudioError::Upstream(err)
    }
}

impl From<WatermarkError> for StudioError {
    fn from(err: WatermarkError) -> Self {
        StudioError::InternalServerError(err.to_string())
    }
}

impl IntoResponse for StudioError {
    fn into_response(self) -> axum::response::Response {
        match self {
            StudioError::BadRequest => {
                info!("Bad request received");
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Bad Request"));
                *response.status_mut() = axum::http::StatusCode::BAD_REQUEST;
                response
            }
            StudioError::Unauthorized => {
                info!("Unauthorized request received");
                let mut response = axum::response::Response::new(axum::body::Body::from(
                    "Unauthorized: invalid or missing session.",
                ));
                *response.status_mut() = axum::http::StatusCode::UNAUTHORIZED;
                response
            }
            StudioError::NotFound(url) => {
                tracing::warn!("404 {url}");
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Not Found"));
                *response.status_mut() = axum::http::StatusCode::NOT_FOUND;
                response
            }
            StudioError::Upstream(err) => {
                tracing::error!("Upstream model error: {}", err);
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Bad Gateway"));
                *response.status_mut() = axum::http::StatusCode::BAD_GATEWAY;
                response
            }
            StudioError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Internal server error"));
                *response.status_mut() = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}
