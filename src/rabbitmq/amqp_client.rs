// src/rabbitmq/amqp_client.rs

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info, warn};

use super::connection::ConnectionSettings;
use super::errors::{RabbitMQError, Result};
use super::topology::{ArgumentValue, QueueArguments};
use crate::message::Message;

/// Opens sessions against a broker. The connection managers call this
/// whenever they have no live session.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: AmqpSession + 'static;

    async fn connect(&self, settings: &ConnectionSettings) -> Result<Self::Session>;
}

/// A connection plus one channel on it.
#[async_trait]
pub trait AmqpSession: Send + Sync {
    /// Both the connection and the channel still report open.
    fn is_open(&self) -> bool;

    async fn declare_exchange(&self, exchange: &str) -> Result<()>;

    async fn declare_queue(&self, queue: &str, arguments: &QueueArguments) -> Result<()>;

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    async fn publish(&self, message: &Message) -> Result<()>;

    /// Channel first, then connection.
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct LapinConnector;

#[async_trait]
impl Connector for LapinConnector {
    type Session = LapinSession;

    async fn connect(&self, settings: &ConnectionSettings) -> Result<LapinSession> {
        let uri = settings.amqp_uri()?;
        debug!(host = %uri.authority.host, port = uri.authority.port, vhost = %uri.vhost, "Opening AMQP connection");

        let connection = Connection::connect_uri(uri, ConnectionProperties::default())
            .await
            .map_err(RabbitMQError::connect_failed)?;

        let channel = connection
            .create_channel()
            .await
            .map_err(RabbitMQError::connect_failed)?;

        if settings.publisher_confirms {
            debug!(channel_id = %channel.id(), "Enabling confirm mode");
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(RabbitMQError::connect_failed)?;
        }

        info!(channel_id = %channel.id(), "Channel created and configured successfully");

        Ok(LapinSession {
            connection,
            channel,
            blocked_timeout: settings.blocked_connection_timeout,
        })
    }
}

pub struct LapinSession {
    connection: Connection,
    channel: Channel,
    blocked_timeout: Duration,
}

#[async_trait]
impl AmqpSession for LapinSession {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn declare_exchange(&self, exchange: &str) -> Result<()> {
        self.channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(RabbitMQError::declare_failed)
    }

    async fn declare_queue(&self, queue: &str, arguments: &QueueArguments) -> Result<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                field_table(arguments),
            )
            .await
            .map(|_| ())
            .map_err(RabbitMQError::declare_failed)
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(RabbitMQError::declare_failed)
    }

    async fn publish(&self, message: &Message) -> Result<()> {
        let mut properties = BasicProperties::default()
            .with_content_type(message.content_type.clone().into())
            .with_delivery_mode(message.delivery_mode())
            .with_message_id(message.message_id.clone().into())
            .with_timestamp(message.timestamp);
        if let Some(encoding) = &message.content_encoding {
            properties = properties.with_content_encoding(encoding.clone().into());
        }

        let options = BasicPublishOptions {
            mandatory: message.mandatory,
            ..BasicPublishOptions::default()
        };

        // A blocked connection stalls the write instead of failing it.
        let write = async {
            let confirm = self
                .channel
                .basic_publish(
                    &message.exchange,
                    &message.routing_key,
                    options,
                    &message.body,
                    properties,
                )
                .await?;
            confirm.await
        };
        let confirmation = tokio::time::timeout(self.blocked_timeout, write).await??;

        match confirmation {
            Confirmation::Nack(_) => Err(RabbitMQError::Transient(format!(
                "broker nacked message for '{}'",
                message.routing_key
            ))),
            Confirmation::Ack(Some(_)) => Err(RabbitMQError::Rejected(format!(
                "message to exchange '{}' with routing key '{}' was returned as unroutable",
                message.exchange, message.routing_key
            ))),
            _ => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        close_in_order(
            async {
                if self.channel.status().connected() {
                    self.channel.close(200, "Normal shutdown").await?;
                }
                Ok::<(), RabbitMQError>(())
            },
            async {
                if self.connection.status().connected() {
                    self.connection.close(200, "Normal shutdown").await?;
                }
                Ok::<(), RabbitMQError>(())
            },
        )
        .await
    }
}

/// Closes the channel, then the connection. The connection is closed even
/// when the channel close fails; the first error is returned.
async fn close_in_order<Ch, Co>(channel: Ch, connection: Co) -> Result<()>
where
    Ch: Future<Output = Result<()>>,
    Co: Future<Output = Result<()>>,
{
    let channel_closed = channel.await;
    if let Err(err) = &channel_closed {
        warn!("Channel close failed, closing connection anyway: {}", err);
    }
    let connection_closed = connection.await;
    channel_closed.and(connection_closed)
}

fn field_table(arguments: &QueueArguments) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in arguments {
        let value = match value {
            ArgumentValue::Bool(flag) => AMQPValue::Boolean(*flag),
            ArgumentValue::Int(number) => AMQPValue::LongLongInt(*number),
            ArgumentValue::Float(number) => AMQPValue::Double(*number),
            ArgumentValue::Str(text) => AMQPValue::LongString(text.clone().into()),
        };
        table.insert(key.clone().into(), value);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::ShortString;

    #[tokio::test]
    async fn connection_closes_even_when_channel_close_fails() {
        let connection_closed = std::cell::Cell::new(false);

        let result = close_in_order(
            async { Err::<(), _>(RabbitMQError::ChannelError("channel already closed".into())) },
            async {
                connection_closed.set(true);
                Ok::<(), RabbitMQError>(())
            },
        )
        .await;

        assert!(connection_closed.get());
        assert!(matches!(result, Err(RabbitMQError::ChannelError(_))));
    }

    #[tokio::test]
    async fn connection_close_error_is_reported() {
        let result = close_in_order(async { Ok::<(), RabbitMQError>(()) }, async {
            Err::<(), _>(RabbitMQError::Transient("socket gone".into()))
        })
        .await;

        assert!(matches!(result, Err(RabbitMQError::Transient(_))));
    }

    #[test]
    fn queue_arguments_become_field_table_entries() {
        let mut arguments = QueueArguments::new();
        arguments.insert("x-message-ttl".into(), ArgumentValue::Int(60_000));
        arguments.insert("x-queue-type".into(), ArgumentValue::Str("quorum".into()));

        let table = field_table(&arguments);
        let inner = table.inner();

        assert_eq!(inner.len(), 2);
        assert_eq!(
            inner.get(&ShortString::from("x-message-ttl")),
            Some(&AMQPValue::LongLongInt(60_000))
        );
    }
}
