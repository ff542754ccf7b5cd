use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::rabbitmq::Result;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const GZIP_ENCODING: &str = "gzip";

/// Body handed to the publisher. Text and JSON are compressed before they hit
/// the wire; raw bytes go out untouched.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    pub fn is_textual(&self) -> bool {
        !matches!(self, Payload::Bytes(_))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PublishOptions {
    /// Ask the broker to return the message when no queue is bound for it.
    pub mandatory: bool,
    pub persistent: bool,
    pub content_type: String,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            mandatory: false,
            persistent: true,
            content_type: JSON_CONTENT_TYPE.to_string(),
        }
    }
}

impl PublishOptions {
    pub fn mandatory() -> Self {
        Self {
            mandatory: true,
            ..Self::default()
        }
    }
}

/// A fully prepared publish. Built once and resent unchanged on every retry.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub content_encoding: Option<String>,
    pub persistent: bool,
    pub mandatory: bool,
    pub message_id: String,
    /// Seconds since the epoch at construction time.
    pub timestamp: u64,
}

impl Message {
    pub fn new(
        exchange: &str,
        routing_key: &str,
        payload: Payload,
        options: &PublishOptions,
    ) -> Result<Self> {
        let (body, content_encoding) = match payload {
            Payload::Text(text) => (gzip(text.as_bytes())?, Some(GZIP_ENCODING.to_string())),
            Payload::Json(value) => {
                let text = serde_json::to_string(&value)?;
                (gzip(text.as_bytes())?, Some(GZIP_ENCODING.to_string()))
            }
            Payload::Bytes(bytes) => (bytes, None),
        };

        Ok(Message {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body,
            content_type: options.content_type.clone(),
            content_encoding,
            persistent: options.persistent,
            mandatory: options.mandatory,
            message_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
        })
    }

    /// AMQP delivery mode: 2 is persistent, 1 transient.
    pub fn delivery_mode(&self) -> u8 {
        if self.persistent {
            2
        } else {
            1
        }
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;

    fn gunzip(data: &[u8]) -> String {
        let mut text = String::new();
        GzDecoder::new(data).read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn text_payload_is_gzipped_and_tagged() {
        let message = Message::new("status", "status", "hello".into(), &PublishOptions::default()).unwrap();

        assert_eq!(message.content_encoding.as_deref(), Some(GZIP_ENCODING));
        assert_eq!(message.content_type, JSON_CONTENT_TYPE);
        assert_eq!(gunzip(&message.body), "hello");
        assert_eq!(message.delivery_mode(), 2);
        assert!(Uuid::parse_str(&message.message_id).is_ok());
    }

    #[test]
    fn json_payload_is_serialized_then_gzipped() {
        let payload = Payload::from(json!({"txId": "abc", "state": "DELIVERED"}));
        let message = Message::new("status", "system-status", payload, &PublishOptions::mandatory()).unwrap();

        let decoded: Value = serde_json::from_str(&gunzip(&message.body)).unwrap();
        assert_eq!(decoded["txId"], "abc");
        assert!(message.mandatory);
        assert_eq!(message.routing_key, "system-status");
    }

    #[test]
    fn raw_bytes_are_sent_as_is() {
        let options = PublishOptions {
            persistent: false,
            content_type: "application/octet-stream".to_string(),
            ..PublishOptions::default()
        };
        let message = Message::new("", "queue", vec![1, 2, 3].into(), &options).unwrap();

        assert_eq!(message.body, vec![1, 2, 3]);
        assert_eq!(message.content_encoding, None);
        assert_eq!(message.delivery_mode(), 1);
        assert!(!Payload::Bytes(vec![]).is_textual());
    }
}
