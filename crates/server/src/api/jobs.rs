//! Background job submission for inputs already on the server's disk.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use mixloop_core::{
    processor::{is_valid_session_id, new_session_id},
    MixJob, MixOptions,
};

use super::error::ApiError;
use crate::metrics::record_job_outcome;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a job
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    /// Server-local source paths, in playback order
    pub inputs: Vec<PathBuf>,
    /// Processing options (all fields default)
    #[serde(default)]
    pub options: MixOptions,
    /// Caller-supplied session id; generated when absent
    pub session_id: Option<String>,
}

/// Response for an accepted job
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub session_id: String,
    pub output_path: PathBuf,
}

// ============================================================================
// Handlers
// ============================================================================

/// Accept a job and run it in the background.
///
/// Progress is observable through `/api/v1/progress` and `/ws/progress`
/// under the returned session id.
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    if body.inputs.is_empty() {
        return Err(ApiError::bad_request("At least one input is required"));
    }
    body.options
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let session_id = resolve_session_id(body.session_id)?;
    let output_path = state
        .config()
        .processing
        .output_dir
        .join(format!("{}.{}", session_id, body.options.format.extension()));

    let job = MixJob::new(body.inputs, output_path.clone())
        .with_session_id(session_id.clone())
        .with_options(body.options);

    info!(
        session_id = %session_id,
        inputs = job.inputs.len(),
        "Accepted background mix job"
    );

    let handle = state.mixer().submit(job).await?;
    tokio::spawn(async move {
        match handle.await {
            Ok(result) => record_job_outcome(&result),
            Err(e) => warn!("Mix job task aborted: {}", e),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateJobResponse {
            session_id,
            output_path,
        }),
    ))
}

/// Validate a caller-supplied session id, or generate one.
///
/// Uniqueness is enforced when the mixer claims the id, which maps a taken
/// id to 409.
pub(crate) fn resolve_session_id(requested: Option<String>) -> Result<String, ApiError> {
    let Some(session_id) = requested.filter(|id| !id.trim().is_empty()) else {
        return Ok(new_session_id());
    };

    if !is_valid_session_id(&session_id) {
        return Err(ApiError::bad_request(format!(
            "Invalid session id: {:?}",
            session_id
        )));
    }

    Ok(session_id)
}
