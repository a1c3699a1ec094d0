//! Queue access for the redrive loop.
//!
//! The loop only needs three primitives from a queue service: locating a queue
//! by name, receiving a batch of messages, and deleting a delivered message by
//! its receipt handle. [`QueueClient`] captures exactly those, so the loop can
//! run against SQS or against the in-memory queue used in tests.

use std::fmt;

use futures_util::future::BoxFuture;
use url::Url;

use crate::{error::Error, message::Message};

pub mod memory;
pub mod sqs;

/// Addressable location of a queue, as returned by [`QueueClient::resolve_endpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEndpoint(Url);

impl QueueEndpoint {
    pub fn parse(url: &str) -> Result<Self, Error> {
        Url::parse(url)
            .map(Self)
            .map_err(|e| Error::invalid_parameter(format!("queue url {url}: {e}")))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Last path segment of the endpoint, which is the queue name for SQS-style URLs.
    pub fn queue_name(&self) -> Option<&str> {
        self.0
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
    }
}

impl fmt::Display for QueueEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Parameters of a single drain call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainRequest {
    /// Upper bound on the number of messages returned.
    pub max_messages: u32,
    /// How long received messages stay hidden from other receivers.
    pub visibility_timeout_seconds: u32,
    /// Long-poll wait for the call.
    pub wait_time_seconds: u32,
}

/// Core trait for queue operations consumed by the redrive loop.
pub trait QueueClient: Send + Sync {
    /// Resolves a queue name to its endpoint.
    ///
    /// Fails with [`Error::QueueNotFound`] if the queue does not exist.
    fn resolve_endpoint<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<QueueEndpoint, Error>>;

    /// Receives up to `request.max_messages` messages. An empty batch means the
    /// queue is drained, at least for now.
    fn drain<'a>(
        &'a self,
        endpoint: &'a QueueEndpoint,
        request: DrainRequest,
    ) -> BoxFuture<'a, Result<Vec<Message>, Error>>;

    /// Deletes a delivered message.
    ///
    /// Fails with [`Error::Acknowledge`] if the receipt handle is unknown or expired.
    fn delete<'a>(
        &'a self,
        endpoint: &'a QueueEndpoint,
        message_id: &'a str,
        receipt_handle: &'a str,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name() {
        let endpoint =
            QueueEndpoint::parse("https://sqs.ap-southeast-2.amazonaws.com/123456789012/orders-dlq")
                .unwrap();
        assert_eq!(endpoint.queue_name(), Some("orders-dlq"));

        let endpoint = QueueEndpoint::parse("https://sqs.ap-southeast-2.amazonaws.com/").unwrap();
        assert_eq!(endpoint.queue_name(), None);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            QueueEndpoint::parse("not a url"),
            Err(Error::InvalidParameter { .. })
        ));
    }
}
