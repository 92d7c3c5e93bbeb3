//! Error types for the progress module.

use thiserror::Error;

/// Errors raised while delivering progress events.
///
/// These never reach a job's outcome; the broadcaster logs them and drops
/// the affected subscriber.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// The subscriber went away before the event could be delivered.
    #[error("Failed to deliver progress for session {session_id}: {reason}")]
    TransportFailure { session_id: String, reason: String },
}

impl ProgressError {
    /// Creates a transport failure for the given session.
    pub fn transport(session_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportFailure {
            session_id: session_id.into(),
            reason: reason.into(),
        }
    }
}
