//! HTTP server for the invoice RAG service

pub mod routes;
pub mod state;

use axum::Router;
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tower_sessions::{MemoryStore, SessionManagerLayer};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::processing::spawn_cleanup_task;
use state::AppState;

/// Invoice RAG HTTP server
pub struct RagServer {
    config: RagConfig,
    state: AppState,
}

impl RagServer {
    /// Create a server backed by Gemini
    pub async fn new(config: RagConfig) -> Result<Self> {
        let state = AppState::new(config.clone()).await?;
        Ok(Self { config, state })
    }

    /// Start the cleanup task and serve until the listener fails
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let _cleanup = spawn_cleanup_task(self.state.clone());
        let app = router(self.state);

        tracing::info!("Starting invoice RAG server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind {}: {}", addr, e)))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Build the full application router for `state`.
///
/// Sessions live in memory and are keyed by a cookie, so the browser keeps its
/// upload across requests.
pub fn router(state: AppState) -> Router {
    let server = &state.config().server;
    let static_files = ServeDir::new(&server.static_dir);
    let max_upload_size = server.max_upload_size;
    let enable_cors = server.enable_cors;

    let sessions = SessionManagerLayer::new(MemoryStore::default()).with_secure(false);

    let app = Router::new()
        .merge(routes::app_routes(max_upload_size))
        .nest_service("/static", static_files)
        .with_state(state)
        .layer(sessions)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}
