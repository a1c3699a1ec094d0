//! Messages as seen by the redrive loop.
//!
//! A message is read-only once drained: the loop only ever inspects its
//! timestamp, forwards its body, and uses its receipt handle to delete it after
//! the target accepted the invocation.

use aws_sdk_sqs::types::MessageSystemAttributeName;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single delivery of a queued message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier assigned by the queue service, unique per delivery.
    pub id: String,
    /// Opaque payload as enqueued by the producer.
    pub body: String,
    /// Single-use token required to delete this delivery.
    pub receipt_handle: String,
    /// When the message was enqueued, in epoch milliseconds.
    pub sent_timestamp: Option<i64>,
}

impl Message {
    /// Returns true when the message was enqueued strictly after `run_start_time`.
    ///
    /// Messages without a timestamp are never considered newer, so they stay
    /// eligible for reprocessing.
    pub fn enqueued_after(&self, run_start_time: i64) -> bool {
        self.sent_timestamp
            .is_some_and(|sent_timestamp| sent_timestamp > run_start_time)
    }

    /// Name of the first identifier this delivery arrived without, if any.
    ///
    /// A delivery without a receipt handle cannot be deleted, so invoking it
    /// would only lead to a second invocation once it reappears.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.id.is_empty() {
            Some("message_id")
        } else if self.receipt_handle.is_empty() {
            Some("receipt_handle")
        } else {
            None
        }
    }
}

impl From<aws_sdk_sqs::types::Message> for Message {
    fn from(message: aws_sdk_sqs::types::Message) -> Self {
        let sent_timestamp = message
            .attributes
            .as_ref()
            .and_then(|attrs| attrs.get(&MessageSystemAttributeName::SentTimestamp))
            .and_then(|ts| ts.parse::<i64>().ok());

        Self {
            id: message.message_id.unwrap_or_default(),
            body: message.body.unwrap_or_default(),
            receipt_handle: message.receipt_handle.unwrap_or_default(),
            sent_timestamp,
        }
    }
}

/// How a message body is turned into an invocation payload.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PayloadFormat {
    /// The body is sent as a JSON string literal.
    #[default]
    Json,
    /// The body bytes are sent unchanged.
    Raw,
}

impl PayloadFormat {
    pub fn encode(&self, body: &str) -> Result<Bytes, serde_json::Error> {
        match self {
            Self::Json => serde_json::to_vec(body).map(Bytes::from),
            Self::Raw => Ok(Bytes::copy_from_slice(body.as_bytes())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn message(sent_timestamp: Option<i64>) -> Message {
        Message {
            id: "m-1".to_owned(),
            body: "{}".to_owned(),
            receipt_handle: "r-1".to_owned(),
            sent_timestamp,
        }
    }

    #[test]
    fn test_enqueued_after() {
        assert!(message(Some(1500)).enqueued_after(1000));
        assert!(!message(Some(1000)).enqueued_after(1000));
        assert!(!message(Some(999)).enqueued_after(1000));
        assert!(!message(None).enqueued_after(1000));
    }

    #[test]
    fn test_from_sqs_message() {
        let sqs = aws_sdk_sqs::types::Message::builder()
            .message_id("abc")
            .receipt_handle("handle")
            .body("hello")
            .attributes(MessageSystemAttributeName::SentTimestamp, "1700000000123")
            .build();

        let message = Message::from(sqs);

        assert_eq!(message.id, "abc");
        assert_eq!(message.body, "hello");
        assert_eq!(message.receipt_handle, "handle");
        assert_eq!(message.sent_timestamp, Some(1_700_000_000_123));
    }

    #[test]
    fn test_from_sqs_message_without_timestamp() {
        let sqs = aws_sdk_sqs::types::Message::builder()
            .message_id("abc")
            .receipt_handle("handle")
            .body("hello")
            .attributes(MessageSystemAttributeName::SentTimestamp, "not-a-number")
            .build();

        assert_eq!(Message::from(sqs).sent_timestamp, None);
    }

    #[test]
    fn test_missing_identifiers() {
        assert_eq!(message(None).missing_field(), None);

        let without_receipt = aws_sdk_sqs::types::Message::builder()
            .message_id("abc")
            .body("hello")
            .build();
        assert_eq!(
            Message::from(without_receipt).missing_field(),
            Some("receipt_handle")
        );

        let without_id = aws_sdk_sqs::types::Message::builder()
            .receipt_handle("handle")
            .body("hello")
            .build();
        assert_eq!(Message::from(without_id).missing_field(), Some("message_id"));
    }

    #[test]
    fn test_payload_encoding() {
        assert_eq!(
            PayloadFormat::Json.encode(r#"{"a":1}"#).unwrap(),
            Bytes::from_static(br#""{\"a\":1}""#)
        );
        assert_eq!(
            PayloadFormat::Raw.encode(r#"{"a":1}"#).unwrap(),
            Bytes::from_static(br#"{"a":1}"#)
        );
    }

    #[test]
    fn test_payload_format_parse() {
        assert_eq!(PayloadFormat::from_str("json").unwrap(), PayloadFormat::Json);
        assert_eq!(PayloadFormat::from_str("raw").unwrap(), PayloadFormat::Raw);
        assert!(PayloadFormat::from_str("xml").is_err());
    }
}
