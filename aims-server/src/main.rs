use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};

use aims_server::api::app;
use aims_server::config::{Config, StorageBackend};
use aims_server::repository::{AcademicRepository, InMemoryRepository, SqliteRepository};
use aims_server::service::AcademicService;
use aims_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting AIMS server {}", aims_server::get_version());

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let (repository, storage): (Arc<dyn AcademicRepository>, &'static str) = match config.storage
    {
        StorageBackend::Sqlite => {
            let db_path = config.database_path();
            info!("Using state database: {}", db_path.display());
            let repository = SqliteRepository::new(&db_path).with_context(|| {
                format!("Failed to open SQLite database {}", db_path.display())
            })?;
            (Arc::new(repository), "sqlite")
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; state is lost on exit");
            (Arc::new(InMemoryRepository::new()), "memory")
        }
    };

    if config.api_token.is_some() {
        info!("API token required on /api routes");
    }

    let app_state = Arc::new(AppState {
        service: AcademicService::new(repository),
        api_token: config.api_token,
        storage,
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app(app_state)).await?;

    Ok(())
}
