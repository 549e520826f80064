//! HTTP routes for the invoice RAG server

pub mod chat;
pub mod process;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use tower_sessions::Session;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::response::MessageResponse;

/// Session key holding the storage filename of the current upload
pub const SESSION_FILENAME_KEY: &str = "filename";

/// Page served by `GET /` and by `POST /` without a question
pub const INDEX_HTML: &str = include_str!("../../../static/index.html");

/// Build all routes
pub fn app_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Chat page and questions; also accepts uploads posted by the page's form
        .route(
            "/",
            get(index_page)
                .post(chat::chat)
                .layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/upload",
            post(upload::upload_file).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/process", post(process::start_processing))
        .route("/processing_status", get(process::processing_status))
        .route("/test", get(test_endpoint))
}

/// Storage filename of the session's current upload
pub async fn session_filename(session: &Session) -> Result<Option<String>> {
    Ok(session.get::<String>(SESSION_FILENAME_KEY).await?)
}

/// GET / - chat page
pub async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /test - liveness check
async fn test_endpoint() -> Json<MessageResponse> {
    Json(MessageResponse::new("Test successful"))
}
