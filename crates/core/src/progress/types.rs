//! Types for the progress module.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transcode::SequenceStage;

/// Stage of a mix session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Validating,
    Preparing,
    Sequencing,
    Processing,
    Merging,
    Looping,
    Enhancing,
    Finalizing,
    Completed,
    Failed,
}

impl Stage {
    /// Whether no further events follow this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Validating => "validating",
            Self::Preparing => "preparing",
            Self::Sequencing => "sequencing",
            Self::Processing => "processing",
            Self::Merging => "merging",
            Self::Looping => "looping",
            Self::Enhancing => "enhancing",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SequenceStage> for Stage {
    fn from(stage: SequenceStage) -> Self {
        match stage {
            SequenceStage::Sequencing => Self::Sequencing,
            SequenceStage::Looping => Self::Looping,
            SequenceStage::Enhancing => Self::Enhancing,
            SequenceStage::Finalizing => Self::Finalizing,
        }
    }
}

/// A progress report for one session.
///
/// Events are immutable; the next event for the same session replaces this
/// one as the session's current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: String,
    pub stage: Stage,
    pub message: String,
    /// Percentage in [0, 100].
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<usize>,
    /// Unix time in milliseconds.
    pub timestamp: i64,
}

impl ProgressEvent {
    /// Creates an event stamped with the current time.
    pub fn new(
        session_id: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
        progress: f64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            stage,
            message: message.into(),
            progress: progress.clamp(0.0, 100.0),
            current_item: None,
            total_items: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Sets the label of the item being worked on.
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.current_item = Some(item.into());
        self
    }

    /// Sets the total number of items.
    pub fn with_total(mut self, total: usize) -> Self {
        self.total_items = Some(total);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Merging.is_terminal());
        assert!(!Stage::Queued.is_terminal());
    }

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(ProgressEvent::new("s", Stage::Processing, "", 140.0).progress, 100.0);
        assert_eq!(ProgressEvent::new("s", Stage::Processing, "", -3.0).progress, 0.0);
    }

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent::new("abc", Stage::Processing, "Processing chunk 1/3", 10.0)
            .with_item("chunk 1")
            .with_total(3);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["session_id"], "abc");
        assert_eq!(json["stage"], "processing");
        assert_eq!(json["current_item"], "chunk 1");
        assert_eq!(json["total_items"], 3);

        let bare = serde_json::to_value(ProgressEvent::new("abc", Stage::Queued, "", 0.0)).unwrap();
        assert!(bare.get("current_item").is_none());
    }

    #[test]
    fn test_stage_from_sequence_stage() {
        assert_eq!(Stage::from(SequenceStage::Looping), Stage::Looping);
        assert_eq!(Stage::from(SequenceStage::Finalizing).to_string(), "finalizing");
    }
}
