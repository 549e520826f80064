//! Per-document processing status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing state of one uploaded document, as reported to polling clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessingStatus {
    #[serde(rename = "not started")]
    NotStarted,
    #[serde(rename = "started")]
    Started,
    /// Text extracted and chunked, embedding under way
    #[serde(rename = "processing")]
    Processing,
    /// Collection built and persisted
    #[serde(rename = "processing_2")]
    Processing2,
    /// QA chain under construction
    #[serde(rename = "processing_3")]
    Processing3,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl ProcessingStatus {
    /// Wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Started => "started",
            Self::Processing => "processing",
            Self::Processing2 => "processing_2",
            Self::Processing3 => "processing_3",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Queued or running
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Started | Self::Processing | Self::Processing2 | Self::Processing3
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status transition with its timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub status: ProcessingStatus,
    pub at: DateTime<Utc>,
}

/// Status history for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProgress {
    pub filename: String,
    pub status: ProcessingStatus,
    pub error: Option<String>,
    pub stages: Vec<StageEvent>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentProgress {
    pub fn new(filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            filename: filename.into(),
            status: ProcessingStatus::Started,
            error: None,
            stages: vec![StageEvent {
                status: ProcessingStatus::Started,
                at: now,
            }],
            updated_at: now,
        }
    }

    /// Record a transition
    pub fn advance(&mut self, status: ProcessingStatus) {
        let now = Utc::now();
        self.status = status;
        self.stages.push(StageEvent { status, at: now });
        self.updated_at = now;
    }

    /// Record a failure with its message
    pub fn fail(&mut self, error: impl Into<String>) {
        self.advance(ProcessingStatus::Failed);
        self.error = Some(error.into());
    }
}
