use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod domain;
mod messaging;
mod metrics;
mod models;
mod service;
mod store;
mod utils;
mod web;

use config::Config;
use messaging::{KafkaBroker, MessageBroker};
use service::OrderService;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,orderflow=debug")),
        )
        .init();

    tracing::info!("🛒 Starting order pipeline service");

    let config = Config::from_env()?;
    let metrics = Arc::new(metrics::Metrics::new()?);

    // Startup precondition: no HTTP listener is bound until the broker
    // connection succeeds, and exhausting the connect retries is fatal.
    let broker = Arc::new(KafkaBroker::new(&config.broker_servers));
    broker.connect().await?;

    let service = Arc::new(OrderService::new(broker.clone(), metrics.clone()));
    service.clone().start_consumers().await?;

    tracing::info!("✨ Pipeline consumers running, ready to receive orders");

    web::start_http_server(
        service,
        metrics,
        &config.http_host,
        config.http_port,
    )
    .await?;

    broker.close().await?;
    Ok(())
}
