//! Ingestion server binary
//!
//! Run with: cargo run -p pdf-ingest --bin pdf-ingest-server

use pdf_ingest::{config::IngestConfig, server::IngestServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_ingest=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                        PDF Ingest                         ║
║          Persistent extraction queue for PDFs             ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration
    let config = IngestConfig::from_env()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Data directory: {}", config.storage.data_dir.display());
    tracing::info!("  - Task database: {}", config.storage.db_path().display());
    tracing::info!("  - Uploads: {}", config.storage.upload_path().display());
    tracing::info!(
        "  - Concurrency: {} (max {})",
        config.queue.concurrency,
        config.queue.max_concurrency
    );
    tracing::info!(
        "  - Extraction timeout: {}s{}",
        config.extraction.timeout_secs,
        if config.extraction.tiered { " (tiered)" } else { "" }
    );

    // Open the store, recover interrupted tasks and start workers
    let server = IngestServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/upload      - Upload PDFs");
    println!("  GET  /api/tasks       - List tasks");
    println!("  GET  /api/queue/stats - Queue statistics");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
