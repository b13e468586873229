//! Pipeline server binary
//!
//! Run with: cargo run --bin docpipe-server [config.toml]

use docpipe::{config::AppConfig, server::PipelineServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docpipe=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path: Option<PathBuf> = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Data dir: {}", config.data.dir.display());
    tracing::info!("  - Embedding model: {}", config.embeddings.default_model);
    tracing::info!("  - Chunk size: {}", config.chunking.chunk_size);
    tracing::info!(
        "  - OCR backend: {}",
        config.ocr.backend_url.as_deref().unwrap_or("(disabled)")
    );
    tracing::info!(
        "  - Vector db: {}",
        config.vector_db.url.as_deref().unwrap_or("(dry run)")
    );

    let server = PipelineServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/pipelines           - Submit documents");
    println!("  GET  /api/pipelines/:id       - Inspect a job");
    println!("  GET  /api/pipelines/:id/stream - Live progress (SSE)");
    println!("  POST /api/process             - Key-authenticated processing");
    println!("  GET  /api/collections         - List collections");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
