//! The redrive control loop.
//!
//! A run resolves the source queue, then repeatedly drains a batch and hands
//! each message to the invocation target, one message at a time. A message is
//! deleted only after its own invocation was accepted; everything else stays
//! in the queue and becomes visible again once its visibility timeout lapses.
//! The run ends on the first empty batch.
//!
//! # Time window
//!
//! When a run start time is given, messages enqueued strictly after it are
//! skipped: their original delivery may still be in flight, and redriving them
//! now would race with it. Messages without an enqueue timestamp are redriven.
//!
//! # Failure isolation
//!
//! Invocation and deletion failures are recorded in [`RunStatistics`] and never
//! stop the run. Only failing to resolve the queue or to receive a batch ends a
//! run early.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    error::Error,
    invoke::{InvocationOutcome, Invoker},
    message::{Message, PayloadFormat},
    queue::{DrainRequest, QueueClient, QueueEndpoint},
};

/// Largest batch the queue service hands out per receive.
pub const MAX_MESSAGES_LIMIT: u32 = 10;
/// Longest visibility timeout the queue service accepts (12 hours).
pub const VISIBILITY_TIMEOUT_LIMIT: u32 = 43_200;
/// Longest long-poll wait the queue service accepts.
pub const WAIT_TIME_LIMIT: u32 = 20;

/// Parameters of one redrive run.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct RedriveConfig {
    /// Maximum number of messages per drain call.
    pub max_messages: u32,
    /// How long a received but not yet deleted message is hidden from other drains.
    ///
    /// Must be at least one second. With zero, a message that keeps failing
    /// is handed out again by the very next drain and the queue never reads empty.
    pub visibility_timeout_seconds: u32,
    /// Long-poll wait of each drain call.
    pub wait_time_seconds: u32,
    /// Epoch milliseconds at which this run began. Enables the time-window filter.
    pub run_start_time: Option<i64>,
    #[builder(default)]
    pub payload_format: PayloadFormat,
}

impl RedriveConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=MAX_MESSAGES_LIMIT).contains(&self.max_messages) {
            return Err(Error::invalid_parameter(format!(
                "max_messages must be between 1 and {MAX_MESSAGES_LIMIT}, got {}",
                self.max_messages
            )));
        }
        if !(1..=VISIBILITY_TIMEOUT_LIMIT).contains(&self.visibility_timeout_seconds) {
            return Err(Error::invalid_parameter(format!(
                "visibility_timeout_seconds must be between 1 and {VISIBILITY_TIMEOUT_LIMIT}, got {}",
                self.visibility_timeout_seconds
            )));
        }
        if self.wait_time_seconds > WAIT_TIME_LIMIT {
            return Err(Error::invalid_parameter(format!(
                "wait_time_seconds must be at most {WAIT_TIME_LIMIT}, got {}",
                self.wait_time_seconds
            )));
        }
        Ok(())
    }

    fn drain_request(&self) -> DrainRequest {
        DrainRequest {
            max_messages: self.max_messages,
            visibility_timeout_seconds: self.visibility_timeout_seconds,
            wait_time_seconds: self.wait_time_seconds,
        }
    }

    /// Whether `message` falls outside this run's time window.
    fn skips(&self, message: &Message) -> bool {
        self.run_start_time
            .is_some_and(|run_start_time| message.enqueued_after(run_start_time))
    }
}

/// Why a message could not be redriven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The invocation service answered without accepting the invocation.
    Rejected { status: i32 },
    /// The invocation could not be made.
    Error { message: String },
    /// The delivery lacked `missing`, so it could not be deleted after an
    /// accepted invocation. Such messages are never invoked.
    Incomplete { missing: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMessage {
    pub message_id: String,
    pub reason: FailureReason,
}

/// Outcome counters of one redrive run.
///
/// Every received message is counted in exactly one of `reprocessed`,
/// `skipped` or `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub received: u64,
    pub reprocessed: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Failed messages in the order they were processed.
    pub failed_messages: Vec<FailedMessage>,
    /// Messages that were accepted by the target but could not be deleted.
    pub unacknowledged: Vec<String>,
    /// Number of non-empty batches processed.
    pub batches: u64,
    /// Set when the run stopped on cancellation rather than on an empty batch.
    pub cancelled: bool,
}

impl RunStatistics {
    /// Identifiers of failed messages, in processing order.
    pub fn failed_message_ids(&self) -> impl Iterator<Item = &str> {
        self.failed_messages.iter().map(|m| m.message_id.as_str())
    }

    /// Whether every received message was counted exactly once.
    pub fn is_consistent(&self) -> bool {
        self.received == self.reprocessed + self.skipped + self.failed
            && self.failed == self.failed_messages.len() as u64
    }

    fn record_failure(&mut self, message_id: &str, reason: FailureReason) {
        self.failed += 1;
        self.failed_messages.push(FailedMessage {
            message_id: message_id.to_owned(),
            reason,
        });
    }
}

/// Drives messages from a queue back into an invocation target.
pub struct Redriver<Q, I> {
    queue: Q,
    invoker: I,
}

impl<Q, I> Redriver<Q, I>
where
    Q: QueueClient,
    I: Invoker,
{
    pub fn new(queue: Q, invoker: I) -> Self {
        Self { queue, invoker }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Redrives `queue_name` into `target` until the queue is observed empty.
    pub async fn run(
        &self,
        queue_name: &str,
        target: &str,
        config: &RedriveConfig,
    ) -> Result<RunStatistics, Error> {
        self.run_until_cancelled(queue_name, target, config, &CancellationToken::new())
            .await
    }

    /// Like [`Redriver::run`], but stops before the next drain once `cancel` fires.
    #[tracing::instrument(skip(self, config, cancel))]
    pub async fn run_until_cancelled(
        &self,
        queue_name: &str,
        target: &str,
        config: &RedriveConfig,
        cancel: &CancellationToken,
    ) -> Result<RunStatistics, Error> {
        config.validate()?;

        let endpoint = self.queue.resolve_endpoint(queue_name).await?;
        tracing::info!(
            %endpoint,
            payload_format = %config.payload_format,
            "Fetching messages from queue"
        );

        let request = config.drain_request();
        let mut stats = RunStatistics::default();

        loop {
            if cancel.is_cancelled() {
                tracing::warn!("Run cancelled");
                stats.cancelled = true;
                break;
            }

            let batch = match self.queue.drain(&endpoint, request).await {
                Ok(batch) => batch,
                Err(e) => return Err(e.with_statistics(stats)),
            };

            if batch.is_empty() {
                tracing::debug!("Received an empty batch");
                break;
            }

            stats.batches += 1;
            stats.received += batch.len() as u64;

            for message in &batch {
                self.process(&endpoint, target, config, message, &mut stats)
                    .await;
            }
        }

        tracing::info!(
            received = stats.received,
            reprocessed = stats.reprocessed,
            skipped = stats.skipped,
            failed = stats.failed,
            unacknowledged = stats.unacknowledged.len(),
            "Run finished"
        );

        Ok(stats)
    }

    #[tracing::instrument(skip_all, fields(message_id = %message.id))]
    async fn process(
        &self,
        endpoint: &QueueEndpoint,
        target: &str,
        config: &RedriveConfig,
        message: &Message,
        stats: &mut RunStatistics,
    ) {
        if let Some(missing) = message.missing_field() {
            tracing::error!(missing, "Message cannot be acknowledged, leaving it in the queue");
            stats.record_failure(
                &message.id,
                FailureReason::Incomplete {
                    missing: missing.to_owned(),
                },
            );
            return;
        }

        if config.skips(message) {
            tracing::info!(
                sent_timestamp = ?message.sent_timestamp,
                "Message was enqueued after the run started, skipping"
            );
            stats.skipped += 1;
            return;
        }

        let payload = match config.payload_format.encode(&message.body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode payload");
                stats.record_failure(
                    &message.id,
                    FailureReason::Error {
                        message: e.to_string(),
                    },
                );
                return;
            }
        };

        tracing::debug!(body = %message.body, "Invoking target");

        match self.invoker.invoke_async(target, payload).await {
            Ok(InvocationOutcome::Accepted) => {
                if let Err(e) = self
                    .queue
                    .delete(endpoint, &message.id, &message.receipt_handle)
                    .await
                {
                    tracing::warn!(error = %e, "Invocation accepted but the message could not be deleted");
                    stats.unacknowledged.push(message.id.clone());
                } else {
                    tracing::debug!("Message deleted");
                }
                stats.reprocessed += 1;
            }
            Ok(InvocationOutcome::Rejected { status }) => {
                tracing::error!(status, "Invocation was not accepted");
                stats.record_failure(&message.id, FailureReason::Rejected { status });
            }
            Err(e) => {
                tracing::error!(error = %e, "Invocation failed");
                stats.record_failure(
                    &message.id,
                    FailureReason::Error {
                        message: e.to_string(),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RedriveConfig {
        RedriveConfig::builder()
            .max_messages(10)
            .visibility_timeout_seconds(40)
            .wait_time_seconds(15)
            .build()
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());

        let invalid = [
            RedriveConfig {
                max_messages: 0,
                ..config()
            },
            RedriveConfig {
                max_messages: 11,
                ..config()
            },
            RedriveConfig {
                visibility_timeout_seconds: 0,
                ..config()
            },
            RedriveConfig {
                visibility_timeout_seconds: 43_201,
                ..config()
            },
            RedriveConfig {
                wait_time_seconds: 21,
                ..config()
            },
        ];

        for config in invalid {
            assert!(
                matches!(config.validate(), Err(Error::InvalidParameter { .. })),
                "Expected {config:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_time_window() {
        let message = |sent_timestamp| Message {
            id: "m".to_owned(),
            body: String::new(),
            receipt_handle: "r".to_owned(),
            sent_timestamp,
        };

        let unbounded = config();
        assert!(!unbounded.skips(&message(Some(i64::MAX))));

        let bounded = RedriveConfig {
            run_start_time: Some(1000),
            ..config()
        };
        assert!(bounded.skips(&message(Some(1500))));
        assert!(!bounded.skips(&message(Some(1000))));
        assert!(!bounded.skips(&message(None)));
    }

    #[test]
    fn test_statistics_consistency() {
        let mut stats = RunStatistics {
            received: 3,
            reprocessed: 1,
            skipped: 1,
            ..Default::default()
        };
        assert!(!stats.is_consistent());

        stats.record_failure("a", FailureReason::Rejected { status: 500 });
        assert!(stats.is_consistent());
        assert_eq!(stats.failed_message_ids().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_statistics_serialization() {
        let mut stats = RunStatistics::default();
        stats.record_failure(
            "a",
            FailureReason::Error {
                message: "boom".to_owned(),
            },
        );

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["failed_messages"][0]["message_id"], "a");
        assert_eq!(json["failed_messages"][0]["reason"]["kind"], "error");
    }

    #[test]
    fn test_validate_bounds_are_inclusive() {
        let config = RedriveConfig {
            max_messages: MAX_MESSAGES_LIMIT,
            visibility_timeout_seconds: 1,
            wait_time_seconds: WAIT_TIME_LIMIT,
            ..config()
        };
        assert!(config.validate().is_ok());

        let config = RedriveConfig {
            visibility_timeout_seconds: VISIBILITY_TIMEOUT_LIMIT,
            wait_time_seconds: 0,
            ..config
        };
        assert!(config.validate().is_ok());
    }
}
