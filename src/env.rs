use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenv::dotenv;

use crate::processing::EventRouting;
use crate::rabbitmq::{BackoffConfig, ConnectionSettings, QueueArguments, RabbitMQError, Result, TopologyDeclaration};

#[derive(Debug, Clone)]
pub struct Config {
    pub amqp_addr: Option<String>,
    pub exchange: String,
    pub user_queue: String,
    pub system_queue: String,
    pub queue_arguments: QueueArguments,
    pub heartbeat_seconds: u16,
    pub connection_attempts: u32,
    pub retry_delay_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub blocked_connection_timeout_seconds: u64,
    pub publisher_confirms: bool,
    pub publish_retries: u32,
    pub publish_min_delay_ms: u64,
    pub publish_max_delay_ms: u64,
}

fn default_exchange() -> String {
    "status".to_string()
}

fn default_user_queue() -> String {
    "status".to_string()
}

fn default_system_queue() -> String {
    "system-status".to_string()
}

impl Config {
    /// Reads the process environment, after loading `.env` if present.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backoff = BackoffConfig::default();
        let connection = ConnectionSettings::default();

        let queue_arguments = match lookup("RABBITMQ_QUEUE_ARGUMENTS") {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw).map_err(|e| {
                RabbitMQError::ConfigError(format!("RABBITMQ_QUEUE_ARGUMENTS: {}", e))
            })?,
            _ => QueueArguments::new(),
        };

        let config = Config {
            amqp_addr: lookup("AMQP_ADDR").filter(|addr| !addr.trim().is_empty()),
            exchange: lookup("RABBITMQ_EXCHANGE").unwrap_or_else(default_exchange),
            user_queue: lookup("RABBITMQ_USER_QUEUE").unwrap_or_else(default_user_queue),
            system_queue: lookup("RABBITMQ_SYSTEM_QUEUE").unwrap_or_else(default_system_queue),
            queue_arguments,
            heartbeat_seconds: parse_or(&lookup, "RABBITMQ_HEARTBEAT_SECONDS", connection.heartbeat)?,
            connection_attempts: parse_or(
                &lookup,
                "RABBITMQ_CONNECTION_ATTEMPTS",
                connection.connection_attempts,
            )?,
            retry_delay_seconds: parse_or(
                &lookup,
                "RABBITMQ_RETRY_DELAY_SECONDS",
                connection.retry_delay.as_secs(),
            )?,
            connect_timeout_seconds: parse_or(
                &lookup,
                "RABBITMQ_CONNECT_TIMEOUT_SECONDS",
                connection.connect_timeout.as_secs(),
            )?,
            blocked_connection_timeout_seconds: parse_or(
                &lookup,
                "RABBITMQ_BLOCKED_CONNECTION_TIMEOUT_SECONDS",
                connection.blocked_connection_timeout.as_secs(),
            )?,
            publisher_confirms: parse_or(
                &lookup,
                "RABBITMQ_PUBLISHER_CONFIRMS",
                connection.publisher_confirms,
            )?,
            publish_retries: parse_or(&lookup, "PUBLISH_RETRIES", backoff.retries)?,
            publish_min_delay_ms: parse_or(
                &lookup,
                "PUBLISH_MIN_DELAY_MS",
                backoff.min_delay.as_millis() as u64,
            )?,
            publish_max_delay_ms: parse_or(
                &lookup,
                "PUBLISH_MAX_DELAY_MS",
                backoff.max_delay.as_millis() as u64,
            )?,
        };

        config.backoff().validate()?;
        Ok(config)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            uri: self.amqp_addr.clone(),
            heartbeat: self.heartbeat_seconds,
            connection_attempts: self.connection_attempts,
            retry_delay: Duration::from_secs(self.retry_delay_seconds),
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
            blocked_connection_timeout: Duration::from_secs(self.blocked_connection_timeout_seconds),
            publisher_confirms: self.publisher_confirms,
        }
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            retries: self.publish_retries,
            min_delay: Duration::from_millis(self.publish_min_delay_ms),
            max_delay: Duration::from_millis(self.publish_max_delay_ms),
            ..BackoffConfig::default()
        }
    }

    pub fn routing(&self) -> EventRouting {
        EventRouting {
            exchange: self.exchange.clone(),
            user_queue: self.user_queue.clone(),
            system_queue: self.system_queue.clone(),
        }
    }

    pub fn topology(&self) -> TopologyDeclaration {
        TopologyDeclaration {
            arguments: self.queue_arguments.clone(),
            ..self.routing().topology()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RabbitMQError::ConfigError(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}
