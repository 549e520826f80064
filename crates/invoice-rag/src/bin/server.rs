//! Invoice RAG server binary
//!
//! Run with: cargo run -p invoice-rag --bin invoice-rag-server

use invoice_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invoice_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RagConfig::load(None)?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Generation model: {}", config.llm.generate_model);
    tracing::info!("  - Embedding model: {}", config.llm.embed_model);
    tracing::info!(
        "  - Chunking: {} chars, {} overlap",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!("  - Uploads: {}", config.storage.uploads_dir.display());
    tracing::info!(
        "  - Retention: {}h",
        config.cleanup.retention().as_secs() / 3600
    );

    let server = RagServer::new(config).await?;

    println!("\nServer starting on http://{}", server.address());
    println!("  GET  /                   - Chat page");
    println!("  POST /upload             - Upload a document");
    println!("  POST /process            - Index the uploaded document");
    println!("  GET  /processing_status  - Poll indexing progress");
    println!("  POST /                   - Ask a question");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
