use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tower_sessions::Session;

use super::csrf::generate_token;
use crate::error::StudioError;

const WORKSPACE_KEY: &str = "workspace_id";

/// The visitor's session plus the workspace it points at, created on first visit.
#[derive(Debug, Clone)]
pub(crate) struct StudioSession {
    pub(crate) session: Session,
    pub(crate) workspace_id: String,
}

impl<S> FromRequestParts<S> for StudioSession
where
    S: Send + Sync,
{
    type Rejection = StudioError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| StudioError::InternalServerError(message.to_string()))?;

        let workspace_id = match session.get::<String>(WORKSPACE_KEY).await? {
            Some(id) => id,
            None => {
                let id = generate_token();
                session.insert(WORKSPACE_KEY, id.clone()).await?;
                id
            }
        };

        Ok(Self {
            session,
            workspace_id,
        })
    }
}
