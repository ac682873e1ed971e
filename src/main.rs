use std::sync::Arc;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use caja::{
    api::{self, AppState},
    audit::TracingAuditSink,
    config::{CliArgs, Config, LoggingConfig},
    storage::open_store,
    Caja, SystemClock,
};

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);
    init_tracing(&config.logging);

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install metrics recorder");
            None
        }
    };

    let storage_config = config.storage.clone();
    let store = match tokio::task::spawn_blocking(move || open_store(&storage_config)).await {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to open storage");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "Storage task failed");
            std::process::exit(1);
        }
    };

    let clock = Arc::new(SystemClock::with_offset(config.ledger.utc_offset()));
    let caja = Caja::new(store, Arc::new(TracingAuditSink), clock, config.ledger.options());
    let state = AppState {
        caja: Arc::new(caja),
        metrics,
    };
    let app = api::router(state, Arc::new(config.auth.clone()));

    let addr = match config.listen_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, host = %config.server.host, "Invalid listen address");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, backend = ?config.storage.backend, auth = config.auth.enabled, "Caja API listening");

    if let Err(e) = axum::Server::bind(&addr).serve(app.into_make_service()).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
