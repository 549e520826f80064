//! Response bodies of the HTTP API

use serde::{Deserialize, Serialize};

use super::status::{DocumentProgress, ProcessingStatus, StageEvent};

/// Canned reply to a greeting once a document is uploaded
pub const GREETING_WITH_FILE: &str = "Hello! I'm here to help with your financial invoice queries. What would you like to know about the uploaded invoice?";
/// Canned reply to a greeting before any upload
pub const GREETING_WITHOUT_FILE: &str = "Hello! I'm here to help with financial invoice analysis. Please upload an invoice file (text, CSV, Excel, image, or PDF) for me to analyze. What would you like to know?";
/// Reply when the session has no upload
pub const UPLOAD_FIRST: &str = "Please upload a file first";
/// Reply when the session's document has no QA chain yet
pub const NOT_INITIALIZED: &str =
    "The QA system is not initialized yet. Please wait for the file to be processed.";

/// `{"message": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body of `GET /processing_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub stages: Vec<StageEvent>,
}

impl StatusResponse {
    pub fn not_started() -> Self {
        Self {
            status: ProcessingStatus::NotStarted,
            error: None,
            stages: Vec::new(),
        }
    }
}

impl From<DocumentProgress> for StatusResponse {
    fn from(progress: DocumentProgress) -> Self {
        Self {
            status: progress.status,
            error: progress.error,
            stages: progress.stages,
        }
    }
}

/// Body of `POST /` with a question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotResponse {
    pub bot_response: String,
    pub source_documents: Vec<String>,
}

impl BotResponse {
    /// Reply without sources
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            bot_response: message.into(),
            source_documents: Vec::new(),
        }
    }

    /// Answer with source snippets, each cut to `snippet_chars` and suffixed with `...`
    pub fn answer(answer: String, sources: &[String], snippet_chars: usize) -> Self {
        Self {
            bot_response: answer,
            source_documents: sources
                .iter()
                .map(|s| format!("{}...", truncate_chars(s, snippet_chars)))
                .collect(),
        }
    }
}

/// First `max` chars of `text`, cut on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippets_truncated_with_ellipsis() {
        let long = "x".repeat(250);
        let response = BotResponse::answer(
            "Total is $42".to_string(),
            &[long, "short".to_string()],
            200,
        );

        assert_eq!(response.source_documents[0].chars().count(), 203);
        assert!(response.source_documents[0].ends_with("..."));
        assert_eq!(response.source_documents[1], "short...");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("€€€€", 2), "€€");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[test]
    fn test_status_response_shape() {
        let body = serde_json::to_value(StatusResponse::not_started()).unwrap();
        assert_eq!(body["status"], "not started");
        assert!(body.get("error").is_none());
    }
}
