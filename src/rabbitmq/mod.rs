// src/rabbitmq/mod.rs
// Resilient RabbitMQ publishing: connection lifecycle, topology, retries

pub mod amqp_client;
pub mod backoff;
pub mod channel_manager;
pub mod connection;
pub mod errors;
pub mod publisher;
pub mod retry;
pub mod topology;

// Re-export specific items to simplify imports elsewhere
pub use amqp_client::{AmqpSession, Connector, LapinConnector, LapinSession};
pub use backoff::{BackoffConfig, BackoffPolicy, CeilingBehavior, Delay};
pub use channel_manager::BlockingConnectionManager;
pub use connection::{ConnectionManager, ConnectionSettings, ExchangeCache};
pub use errors::{RabbitMQError, Result};
pub use publisher::{BlockingPublisher, Publisher};
pub use retry::{RetryLoop, Step};
pub use topology::{ArgumentValue, QueueArguments, TopologyDeclaration};
