//! Processing trigger and status polling

use axum::{extract::State, Json};
use tower_sessions::Session;

use super::session_filename;
use crate::error::{Error, Result};
use crate::processing::SubmitOutcome;
use crate::server::state::AppState;
use crate::types::response::{MessageResponse, StatusResponse};

/// POST /process - queue the session's upload
pub async fn start_processing(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<MessageResponse>> {
    let filename = session_filename(&session)
        .await?
        .ok_or_else(|| Error::InvalidUpload("No file uploaded".to_string()))?;

    let message = match state.job_queue().submit(&filename)? {
        SubmitOutcome::Queued(_) => "Processing started",
        SubmitOutcome::AlreadyInProgress => "Processing already in progress",
    };
    Ok(Json(MessageResponse::new(message)))
}

/// GET /processing_status - status of the session's upload
pub async fn processing_status(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<StatusResponse>> {
    let status = session_filename(&session)
        .await?
        .and_then(|filename| state.job_queue().status(&filename))
        .map(StatusResponse::from)
        .unwrap_or_else(StatusResponse::not_started);

    Ok(Json(status))
}
