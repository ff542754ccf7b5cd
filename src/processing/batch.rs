// src/processing/batch.rs
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::message::{Payload, PublishOptions};
use crate::models::StatusEvent;
use crate::rabbitmq::{Connector, Publisher, TopologyDeclaration};

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Request body must contain at least one event")]
    EmptyBatch,

    #[error("Validation failed for event {index}: {reason}")]
    InvalidEvent { index: usize, reason: String },
}

/// Where status events go. The routing key is always the queue name.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRouting {
    pub exchange: String,
    pub user_queue: String,
    pub system_queue: String,
}

impl EventRouting {
    pub fn queue_for(&self, event: &StatusEvent) -> &str {
        if event.is_system_event() {
            &self.system_queue
        } else {
            &self.user_queue
        }
    }

    pub fn topology(&self) -> TopologyDeclaration {
        TopologyDeclaration::new(
            &self.exchange,
            [self.user_queue.as_str(), self.system_queue.as_str()],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Success,
    PartialSuccess,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventError {
    /// `txId` of the failed event.
    pub event: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub status: BatchStatus,
    pub processed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EventError>,
}

impl BatchOutcome {
    fn new(total: usize, errors: Vec<EventError>) -> Self {
        let status = if errors.is_empty() {
            BatchStatus::Success
        } else {
            BatchStatus::PartialSuccess
        };
        Self {
            status,
            processed: total - errors.len(),
            errors,
        }
    }
}

/// Validates the whole batch, then publishes events one at a time. A failed
/// event is recorded and the rest of the batch still goes out.
pub async fn publish_batch<C: Connector>(
    publisher: &Publisher<C>,
    routing: &EventRouting,
    events: &[StatusEvent],
    cancel: Option<&CancellationToken>,
) -> Result<BatchOutcome, ValidationError> {
    if events.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    for (index, event) in events.iter().enumerate() {
        event
            .validate()
            .map_err(|reason| ValidationError::InvalidEvent { index, reason })?;
    }

    let options = PublishOptions::default();
    let mut errors = Vec::new();

    for event in events {
        let queue = routing.queue_for(event);
        let result = match Payload::json(event) {
            Ok(payload) => match cancel {
                Some(token) => {
                    publisher
                        .publish_cancellable(&routing.exchange, queue, payload, &options, token)
                        .await
                }
                None => publisher.publish(&routing.exchange, queue, payload, &options).await,
            },
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            error!("Failed to publish event {}: {}", event.tx_id, err);
            errors.push(EventError {
                event: event.tx_id.clone(),
                error: err.to_string(),
            });
        }
    }

    let outcome = BatchOutcome::new(events.len(), errors);
    info!(
        processed = outcome.processed,
        failed = outcome.errors.len(),
        "Batch published"
    );
    Ok(outcome)
}
