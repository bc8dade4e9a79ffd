use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use pdf_qa::{
    config::Config,
    db::{self, PgDocumentRegistry},
    llm::create_provider_clients,
    routes::create_router,
    storage::Storage,
    utils::init_logger,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Keep the guard alive for the lifetime of the process
    let _log_guard = init_logger(config.logging.log_dir.as_deref());
    info!("Configuration loaded: {:?}", config.server);

    Storage::new(config.storage.upload_dir.clone(), config.storage.max_file_size)
        .ensure_dir()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create upload directory: {}", e))?;

    // Connect to database
    let pool = db::create_pool(&config.database).await?;

    info!("Running database migrations...");
    db::run_migrations(&pool).await?;
    info!("Database migrations completed");

    if config.llm.active_api_key().is_none() {
        warn!(
            provider = %config.llm.provider,
            "No API key configured for the LLM provider; questions will fail"
        );
    }
    let clients = create_provider_clients(&config.llm)
        .map_err(|e| anyhow::anyhow!("Failed to create provider clients: {}", e))?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let registry = Arc::new(PgDocumentRegistry::new(pool));
    let state = AppState::new(config, registry, clients)
        .map_err(|e| anyhow::anyhow!("Failed to build application state: {}", e))?;

    let app = create_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
