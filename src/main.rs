use std::sync::Arc;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use balance_engine::{
    config::{CliArgs, Config, LoggingConfig, StorageKind},
    engine::BalanceEngine,
    http::{router, AppState},
    report_registry::ReportRegistry,
    sqlite_storage::SqliteStorage,
    storage::{InMemoryStorage, StorageBackend},
};

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);

    init_tracing(&config.logging);

    let metrics = PrometheusBuilder::new().install_recorder()?;

    let storage: Arc<dyn StorageBackend> = match config.storage.backend {
        StorageKind::Memory => {
            tracing::warn!("In-memory storage selected; reports will be empty");
            Arc::new(InMemoryStorage::new())
        }
        StorageKind::Sqlite => Arc::new(SqliteStorage::new(&config.storage.path)?),
    };

    let engine = BalanceEngine::new(storage, Arc::new(ReportRegistry::with_defaults()), config.engine_options());
    let app = router(AppState {
        engine: Arc::new(engine),
        metrics: Some(metrics),
    });

    let addr = config.listen_addr()?;
    tracing::info!(
        %addr,
        backend = ?config.storage.backend,
        base_currency = %config.valuation.base_currency,
        "Balance engine listening"
    );

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
