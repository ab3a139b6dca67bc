use finance_brief_router::{agent::Orchestrator, api::start_server, build_registry, AppConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("Finance Brief Router - API Server");
    info!("Port: {}", config.port);

    let registry = build_registry(&config)?;
    let enabled = registry.list();
    if enabled.is_empty() {
        warn!("No capabilities configured; every query will fail");
    }
    info!(capabilities = ?enabled, "Agent registry built");

    let orchestrator = Arc::new(Orchestrator::new(registry, config.router.clone()));

    info!("Orchestrator initialized");

    start_server(orchestrator, config.port).await?;

    Ok(())
}
