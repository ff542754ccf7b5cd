// src/rabbitmq/topology.rs
// Exchange, queue and binding declaration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::amqp_client::AmqpSession;
use super::errors::Result;

/// Scalar value accepted as a queue argument (`x-message-ttl`, `x-queue-type`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

pub type QueueArguments = BTreeMap<String, ArgumentValue>;

/// A durable direct exchange and the durable queues bound to it. Each queue
/// is bound with its own name as the routing key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TopologyDeclaration {
    pub exchange: String,
    pub queues: Vec<String>,
    pub arguments: QueueArguments,
}

impl TopologyDeclaration {
    pub fn new<Q, S>(exchange: &str, queues: Q) -> Self
    where
        Q: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exchange: exchange.to_string(),
            queues: queues.into_iter().map(Into::into).collect(),
            arguments: QueueArguments::new(),
        }
    }

    pub fn with_argument(mut self, key: &str, value: ArgumentValue) -> Self {
        self.arguments.insert(key.to_string(), value);
        self
    }
}

/// Declares the whole topology on an open session. Broker refusals surface as
/// declaration errors and are never retried.
pub(crate) async fn declare_on<S: AmqpSession + ?Sized>(
    session: &S,
    declaration: &TopologyDeclaration,
) -> Result<()> {
    let exchange = declaration.exchange.as_str();

    session
        .declare_exchange(exchange)
        .await
        .map_err(|e| e.into_declaration(&format!("exchange '{}'", exchange)))?;

    for queue in &declaration.queues {
        session
            .declare_queue(queue, &declaration.arguments)
            .await
            .map_err(|e| e.into_declaration(&format!("queue '{}'", queue)))?;

        session
            .bind_queue(queue, exchange, queue)
            .await
            .map_err(|e| e.into_declaration(&format!("binding '{}' -> '{}'", queue, exchange)))?;

        info!(exchange = %exchange, queue = %queue, "Queue declared and bound");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_queues_in_order() {
        let declaration = TopologyDeclaration::new("status", ["status", "system-status"])
            .with_argument("x-queue-type", ArgumentValue::Str("quorum".into()));

        assert_eq!(declaration.queues, vec!["status", "system-status"]);
        assert_eq!(
            declaration.arguments.get("x-queue-type"),
            Some(&ArgumentValue::Str("quorum".into()))
        );
    }

    #[test]
    fn arguments_parse_from_json_scalars() {
        let arguments: QueueArguments =
            serde_json::from_str(r#"{"x-message-ttl": 60000, "x-queue-type": "classic", "x-lazy": true, "x-ratio": 0.5}"#)
                .unwrap();

        assert_eq!(arguments["x-message-ttl"], ArgumentValue::Int(60000));
        assert_eq!(arguments["x-queue-type"], ArgumentValue::Str("classic".into()));
        assert_eq!(arguments["x-lazy"], ArgumentValue::Bool(true));
        assert_eq!(arguments["x-ratio"], ArgumentValue::Float(0.5));
    }
}
