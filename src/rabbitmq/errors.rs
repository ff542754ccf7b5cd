// src/rabbitmq/errors.rs

use lapin::protocol::{AMQPErrorKind, AMQPHardError, AMQPSoftError};
use lapin::Error as LapinError;
use serde_json::Error as SerdeError;
use thiserror::Error;
use tokio::time::error::Elapsed;

#[derive(Debug, Error)]
pub enum RabbitMQError {
    #[error("RabbitMQ connection error: {0}")]
    ConnectionError(String),

    #[error("RabbitMQ connection error: invalid connection string: {0}")]
    InvalidUri(String),

    #[error("RabbitMQ channel error: {0}")]
    ChannelError(String),

    #[error("RabbitMQ transient error: {0}")]
    Transient(String),

    #[error("RabbitMQ operation timed out: {0}")]
    Timeout(String),

    #[error("RabbitMQ rejected the operation: {0}")]
    Rejected(String),

    #[error("RabbitMQ declaration error: {0}")]
    DeclarationError(String),

    #[error("RabbitMQ publish failed after {attempts} attempts: {source}")]
    PublishFailed {
        attempts: u32,
        #[source]
        source: Box<RabbitMQError>,
    },

    #[error("Publish cancelled")]
    Cancelled,

    #[error("Message serialization error: {0}")]
    SerializationError(#[from] SerdeError),

    #[error("Message compression error: {0}")]
    CompressionError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection lock acquisition failed")]
    LockError,
}

// Custom Result type for RabbitMQ operations
pub type Result<T> = std::result::Result<T, RabbitMQError>;

impl RabbitMQError {
    /// Failures worth another attempt after reconnecting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RabbitMQError::Transient(_) | RabbitMQError::ChannelError(_) | RabbitMQError::Timeout(_)
        )
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RabbitMQError::ConnectionError(_) | RabbitMQError::InvalidUri(_)
        )
    }

    /// Re-labels a failure that happened while declaring topology. Connection
    /// failures keep their own class.
    pub(crate) fn into_declaration(self, context: &str) -> Self {
        match self {
            err @ (RabbitMQError::ConnectionError(_)
            | RabbitMQError::InvalidUri(_)
            | RabbitMQError::DeclarationError(_)) => err,
            other => RabbitMQError::DeclarationError(format!("{}: {}", context, other)),
        }
    }

    /// Error raised while negotiating a connection, whatever lapin reports.
    pub(crate) fn connect_failed(error: LapinError) -> Self {
        RabbitMQError::ConnectionError(error.to_string())
    }

    /// Error raised by a declare call; broker refusals become declaration errors.
    pub(crate) fn declare_failed(error: LapinError) -> Self {
        match RabbitMQError::from(error) {
            RabbitMQError::Rejected(reason) => RabbitMQError::DeclarationError(reason),
            other => other,
        }
    }
}

// Converting from lapin errors
impl From<LapinError> for RabbitMQError {
    fn from(error: LapinError) -> Self {
        let error_text = error.to_string();

        match error {
            LapinError::InvalidChannelState(_) | LapinError::InvalidChannel(_) => {
                RabbitMQError::ChannelError(error_text)
            }
            LapinError::ProtocolError(ref amqp) => {
                if is_transient_protocol_error(amqp.kind()) {
                    RabbitMQError::Transient(error_text)
                } else {
                    RabbitMQError::Rejected(error_text)
                }
            }
            LapinError::SerialisationError(_) => RabbitMQError::Rejected(error_text),
            // connection state, io, parsing and heartbeat faults
            _ => RabbitMQError::Transient(error_text),
        }
    }
}

/// Hard errors close the connection and a fresh one may succeed; soft errors
/// and contract violations will fail the same way again.
pub(crate) fn is_transient_protocol_error(kind: &AMQPErrorKind) -> bool {
    match kind {
        AMQPErrorKind::Soft(AMQPSoftError::RESOURCELOCKED) => true,
        AMQPErrorKind::Soft(_) => false,
        AMQPErrorKind::Hard(hard) => matches!(
            hard,
            AMQPHardError::CONNECTIONFORCED
                | AMQPHardError::CHANNELERROR
                | AMQPHardError::RESOURCEERROR
                | AMQPHardError::INTERNALERROR
                | AMQPHardError::FRAMEERROR
                | AMQPHardError::UNEXPECTEDFRAME
        ),
    }
}

impl From<Elapsed> for RabbitMQError {
    fn from(_: Elapsed) -> Self {
        RabbitMQError::Timeout("broker did not answer in time".to_string())
    }
}
