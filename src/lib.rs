//! Relays status events to RabbitMQ through a publishing client that repairs
//! its own connection and retries transient failures with jittered backoff.
//!
//! Two shapes of the same client are provided: [`rabbitmq::Publisher`] for a
//! single-threaded async runtime and [`rabbitmq::BlockingPublisher`] for
//! callers on plain threads.

pub mod env;
pub mod message;
pub mod models;
pub mod processing;
pub mod rabbitmq;

pub use message::{Message, Payload, PublishOptions};
pub use rabbitmq::{RabbitMQError, Result};
