use std::rc::Rc;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rabbit_relay::env::Config;
use rabbit_relay::models::StatusEvent;
use rabbit_relay::processing::publish_batch;
use rabbit_relay::rabbitmq::{ConnectionManager, LapinConnector, Publisher};

/// Reads a JSON array of status events on stdin, publishes each one and
/// prints the batch outcome.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    let routing = config.routing();

    let manager = Rc::new(ConnectionManager::new(
        LapinConnector,
        config.connection_settings(),
    ));

    info!(exchange = %routing.exchange, "Declaring RabbitMQ topology");
    manager
        .declare(&config.topology())
        .await
        .context("Failed to declare RabbitMQ topology")?;

    let publisher = Publisher::new(Rc::clone(&manager), config.backoff())
        .context("Invalid publish retry settings")?;

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read events from stdin")?;
    let events: Vec<StatusEvent> =
        serde_json::from_str(&input).context("Input must be a JSON array of status events")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling pending retries");
            on_signal.cancel();
        }
    });

    let outcome = publish_batch(&publisher, &routing, &events, Some(&cancel)).await;

    manager.close().await;

    let outcome = outcome.context("Rejected batch")?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
