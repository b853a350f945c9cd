use chat_digest::{api::start_server, config::AppConfig, DigestContext, ReportJob};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("🚀 Chat Digest - API Server");
    info!("📍 Port: {}", config.port);
    info!("📁 Reports: {}", config.reports_dir.display());

    let job = Arc::new(ReportJob::from_config(&config, DigestContext::new())?);

    info!("✅ Report pipeline initialized");
    info!("📡 Starting API server...");

    start_server(job, config.port).await?;

    Ok(())
}
