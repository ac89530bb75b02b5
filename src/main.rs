use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use coindb::config::{CliArgs, Config};
use coindb::economy::Economy;
use coindb::http;
use coindb::storage;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let ledger = match storage::open_backend(&config.storage) {
        Ok(ledger) => ledger,
        Err(e) => {
            tracing::error!(error = %e, "failed to open storage backend");
            std::process::exit(1);
        }
    };
    let economy = Arc::new(Economy::new(ledger, config.currency.clone()));
    let app = http::router(economy, Arc::new(config.auth.clone()));

    let addr = config.listen_addr();
    tracing::info!(%addr, backend = ?config.storage.backend, "coindb listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
