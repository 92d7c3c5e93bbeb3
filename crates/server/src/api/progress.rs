//! Polling access to session progress.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use mixloop_core::ProgressEvent;

use super::error::ApiError;
use crate::state::AppState;

/// Query parameters naming a session
#[derive(Debug, Deserialize)]
pub struct SessionParams {
    pub session_id: Option<String>,
}

impl SessionParams {
    /// The session id, or a 400 when it is missing or blank.
    pub fn require(self) -> Result<String, ApiError> {
        self.session_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("session_id is required"))
    }
}

/// Last published event of a session
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SessionParams>,
) -> Result<Json<ProgressEvent>, ApiError> {
    let session_id = params.require()?;
    state
        .broadcaster()
        .get(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Unknown session: {}", session_id)))
}

/// Forget a session and close its live subscriptions
pub async fn delete_progress(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> StatusCode {
    let existed = state.broadcaster().cleanup(&session_id).await;
    debug!(session_id = %session_id, existed, "Cleaned up progress");
    StatusCode::NO_CONTENT
}
