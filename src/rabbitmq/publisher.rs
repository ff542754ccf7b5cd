use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::amqp_client::Connector;
use super::backoff::BackoffConfig;
use super::channel_manager::BlockingConnectionManager;
use super::connection::ConnectionManager;
use super::errors::{RabbitMQError, Result};
use super::retry::{RetryLoop, Step};
use crate::message::{Message, Payload, PublishOptions};

/// Publisher for the cooperative runtime. Cheap to clone; clones share the
/// connection manager.
pub struct Publisher<C: Connector> {
    manager: Rc<ConnectionManager<C>>,
    backoff: BackoffConfig,
}

impl<C: Connector> Clone for Publisher<C> {
    fn clone(&self) -> Self {
        Self {
            manager: Rc::clone(&self.manager),
            backoff: self.backoff.clone(),
        }
    }
}

impl<C: Connector> Publisher<C> {
    pub fn new(manager: Rc<ConnectionManager<C>>, backoff: BackoffConfig) -> Result<Self> {
        backoff.validate()?;
        Ok(Self { manager, backoff })
    }

    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: impl Into<Payload>,
        options: &PublishOptions,
    ) -> Result<()> {
        let message = Message::new(exchange, routing_key, payload.into(), options)?;
        self.send(&message, None).await
    }

    /// Like [`Publisher::publish`], but a cancelled token ends any backoff
    /// wait with [`RabbitMQError::Cancelled`].
    pub async fn publish_cancellable(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: impl Into<Payload>,
        options: &PublishOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let message = Message::new(exchange, routing_key, payload.into(), options)?;
        self.send(&message, Some(cancel)).await
    }

    /// Sends a prepared message. A failed initial connect is returned as is;
    /// transient write failures are retried with backoff.
    pub async fn send(&self, message: &Message, cancel: Option<&CancellationToken>) -> Result<()> {
        self.manager.ensure_connected().await?;

        let mut retry = RetryLoop::new(self.backoff.clone());
        loop {
            let failure = match self.manager.write(message).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let reason = failure.to_string();
            match retry.on_failure(failure) {
                Step::Fail(err) => {
                    error!(
                        exchange = %message.exchange,
                        routing_key = %message.routing_key,
                        attempts = retry.attempts(),
                        "Publish failed: {}", err
                    );
                    return Err(err);
                }
                Step::Retry(delay) => {
                    warn!(
                        exchange = %message.exchange,
                        routing_key = %message.routing_key,
                        attempt = retry.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Publish attempt failed, retrying: {}", reason
                    );
                    suspend(delay, cancel).await?;
                    self.manager.ensure_connected().await?;
                }
            }
        }
    }
}

/// Publisher for thread-based callers. Backoff sleeps happen outside the
/// manager's lock, so one thread's retry never stalls the others.
pub struct BlockingPublisher<C: Connector> {
    manager: Arc<BlockingConnectionManager<C>>,
    backoff: BackoffConfig,
}

impl<C: Connector> Clone for BlockingPublisher<C> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            backoff: self.backoff.clone(),
        }
    }
}

impl<C: Connector> BlockingPublisher<C> {
    pub fn new(manager: Arc<BlockingConnectionManager<C>>, backoff: BackoffConfig) -> Result<Self> {
        backoff.validate()?;
        Ok(Self { manager, backoff })
    }

    pub fn manager(&self) -> &BlockingConnectionManager<C> {
        &self.manager
    }

    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: impl Into<Payload>,
        options: &PublishOptions,
    ) -> Result<()> {
        let message = Message::new(exchange, routing_key, payload.into(), options)?;
        self.send(&message, None)
    }

    pub fn publish_cancellable(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: impl Into<Payload>,
        options: &PublishOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let message = Message::new(exchange, routing_key, payload.into(), options)?;
        self.send(&message, Some(cancel))
    }

    pub fn send(&self, message: &Message, cancel: Option<&CancellationToken>) -> Result<()> {
        self.manager.ensure_connected()?;

        let mut retry = RetryLoop::new(self.backoff.clone());
        loop {
            let failure = match self.manager.write(message) {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let reason = failure.to_string();
            match retry.on_failure(failure) {
                Step::Fail(err) => {
                    error!(
                        exchange = %message.exchange,
                        routing_key = %message.routing_key,
                        attempts = retry.attempts(),
                        "Publish failed: {}", err
                    );
                    return Err(err);
                }
                Step::Retry(delay) => {
                    warn!(
                        exchange = %message.exchange,
                        routing_key = %message.routing_key,
                        attempt = retry.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Publish attempt failed, retrying: {}", reason
                    );
                    self.manager.block_on(suspend(delay, cancel))?;
                    self.manager.ensure_connected()?;
                }
            }
        }
    }
}

/// Waits out a backoff delay unless the token fires first.
async fn suspend(delay: Duration, cancel: Option<&CancellationToken>) -> Result<()> {
    let Some(cancel) = cancel else {
        tokio::time::sleep(delay).await;
        return Ok(());
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Publish retry cancelled during backoff");
            Err(RabbitMQError::Cancelled)
        }
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
