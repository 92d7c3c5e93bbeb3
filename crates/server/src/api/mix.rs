//! Synchronous mix endpoint: upload sources, receive the artifact.

use axum::{
    body::Bytes,
    extract::{multipart::Field, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use mixloop_core::{MixError, MixJob, MixOptions, OutputFormat};
use uuid::Uuid;

use super::error::ApiError;
use super::jobs::resolve_session_id;
use crate::metrics::record_job_outcome;
use crate::state::AppState;

/// Multipart form of a mix request.
#[derive(Debug, Default)]
pub struct MixForm {
    /// Uploaded sources as (client file name, contents), in upload order
    pub files: Vec<(String, Bytes)>,
    pub options: MixOptions,
    pub session_id: Option<String>,
}

impl MixForm {
    /// Read every field of the request. Unknown fields are skipped.
    pub async fn from_multipart(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut form = MixForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "audio_files" | "audio_files[]" => {
                    let file_name = field
                        .file_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("track_{}.mp3", form.files.len()));
                    let data = field.bytes().await.map_err(|e| {
                        ApiError::bad_request(format!("Failed to read {}: {}", file_name, e))
                    })?;
                    form.files.push((file_name, data));
                }
                "loops" => {
                    form.options.loops = parse_loops(&field_text(field).await?);
                }
                "crossfade" => {
                    form.options.crossfade_secs = parse_crossfade(&field_text(field).await?);
                }
                "enhance" => {
                    form.options.enhance = parse_flag(&field_text(field).await?, true);
                }
                "dolby_stereo" => {
                    form.options.stereo = parse_flag(&field_text(field).await?, false);
                }
                "format" => {
                    form.options.format = OutputFormat::from_name(&field_text(field).await?);
                }
                "session_id" => {
                    form.session_id = Some(field_text(field).await?.trim().to_string());
                }
                other => debug!("Ignoring multipart field {:?}", other),
            }
        }

        Ok(form)
    }
}

async fn field_text(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid form field: {}", e)))
}

/// Loop count; anything that is not a positive integer means 1.
pub fn parse_loops(value: &str) -> u32 {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n >= 1)
        .unwrap_or(1)
}

/// Crossfade seconds; anything that is not a finite non-negative number means 2.0.
pub fn parse_crossfade(value: &str) -> f64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .unwrap_or(2.0)
}

/// Checkbox-style boolean with a fallback for unrecognized values.
pub fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

/// Keep only the final path component and replace anything outside
/// `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Write the uploads under `dir`, prefixed with their position so the
/// playback order survives name collisions.
async fn save_uploads(dir: &Path, files: &[(String, Bytes)]) -> std::io::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;
    let mut paths = Vec::with_capacity(files.len());
    for (i, (name, data)) in files.iter().enumerate() {
        let path = dir.join(format!("{:03}_{}", i, sanitize_file_name(name)));
        tokio::fs::write(&path, data).await?;
        paths.push(path);
    }
    Ok(paths)
}

/// Run a mix over the uploaded sources and return the artifact.
pub async fn create_mix(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = MixForm::from_multipart(&mut multipart).await?;
    if form.files.is_empty() {
        return Err(ApiError::bad_request("No audio files uploaded"));
    }

    let session_id = resolve_session_id(form.session_id)?;
    let processing = &state.config().processing;
    // Per request, since the session id is only claimed once the mixer runs.
    let upload_dir = processing.upload_dir.join(Uuid::new_v4().to_string());
    let format = form.options.format;
    let output_path = processing
        .output_dir
        .join(format!("{}.{}", session_id, format.extension()));

    info!(
        session_id = %session_id,
        files = form.files.len(),
        loops = form.options.loops,
        crossfade = form.options.crossfade_secs,
        "Received mix request"
    );

    let result = match save_uploads(&upload_dir, &form.files).await {
        Ok(inputs) => {
            let job = MixJob::new(inputs, output_path.clone())
                .with_session_id(session_id.clone())
                .with_options(form.options);
            let result = state.mixer().run(job).await;
            if !matches!(result, Err(MixError::SessionInUse { .. })) {
                record_job_outcome(&result);
            }
            result.map_err(ApiError::from)
        }
        Err(e) => Err(ApiError::internal(format!("Failed to store uploads: {}", e))),
    };

    if let Err(e) = tokio::fs::remove_dir_all(&upload_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(session_id = %session_id, "Failed to remove uploads: {}", e);
        }
    }

    let artifact = result?;
    let bytes = tokio::fs::read(&artifact)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read mix output: {}", e)))?;
    if let Err(e) = tokio::fs::remove_file(&artifact).await {
        warn!(session_id = %session_id, "Failed to remove delivered output: {}", e);
    }

    let disposition = format!(
        "attachment; filename=\"mix_{}.{}\"",
        session_id,
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
