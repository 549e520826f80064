//! Upload endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use tower_sessions::Session;

use super::{session_filename, SESSION_FILENAME_KEY};
use crate::error::{Error, Result};
use crate::ingestion::secure_filename;
use crate::server::state::AppState;
use crate::types::response::MessageResponse;

/// A `file` part read from a multipart body
pub struct FilePart {
    pub filename: String,
    pub data: axum::body::Bytes,
}

/// POST /upload - store a file and make it the session's current document
pub async fn upload_file(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>> {
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidUpload(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| Error::InvalidUpload(format!("Failed to read file: {}", e)))?;
            file = Some(FilePart { filename, data });
            break;
        }
    }

    let file = file.ok_or_else(|| Error::InvalidUpload("No file part".to_string()))?;
    Ok(Json(store_upload(&state, &session, file).await?))
}

/// Replace the session's upload with `file`.
///
/// The new file is stored first. Only once it is on disk and the session points at it
/// is the previous file deleted and its QA chain dropped, so a rejected or failed
/// upload leaves the session, the old file and its chain untouched.
pub async fn store_upload(state: &AppState, session: &Session, file: FilePart) -> Result<MessageResponse> {
    if file.filename.is_empty() {
        return Err(Error::InvalidUpload("No selected file".to_string()));
    }
    if secure_filename(&file.filename).is_empty() {
        return Err(Error::InvalidUpload("Invalid filename".to_string()));
    }

    let previous = session_filename(session).await?;

    let stored = state
        .uploads()
        .save(&file.filename, &file.data)
        .await
        .map_err(|e| match e {
            Error::InvalidUpload(_) => e,
            other => Error::UploadFailed(other.to_string()),
        })?;

    if let Err(e) = session.insert(SESSION_FILENAME_KEY, &stored.filename).await {
        if let Err(remove_err) = state.uploads().remove(&stored.filename).await {
            tracing::warn!("Failed to remove '{}': {}", stored.filename, remove_err);
        }
        return Err(e.into());
    }

    // File before chain: a worker registering concurrently re-checks the file
    if let Some(previous) = previous.filter(|p| *p != stored.filename) {
        match state.uploads().remove(&previous).await {
            Ok(true) => tracing::info!("Removed previous upload '{}'", previous),
            Ok(false) => {}
            Err(e) => tracing::error!("Cleanup error for '{}': {}", previous, e),
        }
        state.remove_chain(&previous);
    }

    tracing::info!("Stored upload '{}' ({} bytes)", stored.filename, stored.size);
    Ok(MessageResponse::new("File uploaded successfully"))
}
