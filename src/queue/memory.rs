//! In-memory implementation of the queue client.
//!
//! Models the parts of SQS delivery semantics the redrive loop depends on:
//! messages become invisible for the visibility timeout once received, every
//! receive hands out a fresh single-use receipt handle, and deleting with a
//! stale handle fails. Long-poll waits are not simulated; an empty receive
//! returns immediately. Primarily used for testing and dry runs.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use futures_util::future::BoxFuture;
use tokio::time::Instant;

use super::{DrainRequest, QueueClient, QueueEndpoint};
use crate::{error::Error, message::Message};

struct StoredMessage {
    id: String,
    body: String,
    sent_timestamp: Option<i64>,
    receipt_handle: Option<String>,
    invisible_until: Option<Instant>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.invisible_until.map_or(true, |until| until <= now)
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    /// Failure reasons keyed by the (1-based) receive call they are forced onto.
    receive_failures: HashMap<u64, String>,
}

/// Thread-safe in-memory queue service.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<State>>,
    next_id: Arc<AtomicU64>,
    receives: Arc<AtomicU64>,
    deletes: Arc<AtomicU64>,
}

impl InMemoryQueue {
    /// Creates a new service with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn endpoint(name: &str) -> Result<QueueEndpoint, Error> {
        QueueEndpoint::parse(&format!("memory://queues/{name}"))
    }

    fn queue_name(endpoint: &QueueEndpoint) -> Result<String, Error> {
        endpoint
            .queue_name()
            .map(str::to_owned)
            .ok_or_else(|| Error::invalid_parameter(format!("no queue name in {endpoint}")))
    }

    /// Creates an empty queue. Existing queues are left untouched.
    pub fn create_queue(&self, name: impl Into<String>) {
        self.state().queues.entry(name.into()).or_default();
    }

    /// Enqueues a message and returns its identifier, creating the queue if needed.
    pub fn send(
        &self,
        queue: impl Into<String>,
        body: impl Into<String>,
        sent_timestamp: Option<i64>,
    ) -> String {
        let id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::Relaxed));

        self.state()
            .queues
            .entry(queue.into())
            .or_default()
            .push_back(StoredMessage {
                id: id.clone(),
                body: body.into(),
                sent_timestamp,
                receipt_handle: None,
                invisible_until: None,
            });

        id
    }

    /// Makes the `call`-th receive call (counting from 1) fail with `reason`.
    pub fn fail_receive(&self, call: u64, reason: impl Into<String>) {
        self.state().receive_failures.insert(call, reason.into());
    }

    /// Invalidates the receipt handle of every in-flight message of `queue`,
    /// as if their visibility timeout had lapsed and they were received elsewhere.
    pub fn expire_receipts(&self, queue: &str) {
        if let Some(messages) = self.state().queues.get_mut(queue) {
            for message in messages.iter_mut() {
                message.receipt_handle = None;
            }
        }
    }

    /// Number of messages currently stored in `queue`, visible or not.
    pub fn len(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Identifiers of the messages stored in `queue`, in enqueue order.
    pub fn message_ids(&self, queue: &str) -> Vec<String> {
        self.state()
            .queues
            .get(queue)
            .map(|messages| messages.iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of receive calls served so far.
    pub fn receive_calls(&self) -> u64 {
        self.receives.load(Ordering::Relaxed)
    }

    /// Number of delete calls issued so far, successful or not.
    pub fn delete_calls(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }
}

impl QueueClient for InMemoryQueue {
    fn resolve_endpoint<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<QueueEndpoint, Error>> {
        Box::pin(async move {
            if !self.state().queues.contains_key(name) {
                return Err(Error::queue_not_found(name));
            }

            Self::endpoint(name)
        })
    }

    fn drain<'a>(
        &'a self,
        endpoint: &'a QueueEndpoint,
        request: DrainRequest,
    ) -> BoxFuture<'a, Result<Vec<Message>, Error>> {
        Box::pin(async move {
            let call = self.receives.fetch_add(1, Ordering::Relaxed) + 1;

            let name = Self::queue_name(endpoint)?;
            let now = Instant::now();
            let invisible_until =
                now + Duration::from_secs(u64::from(request.visibility_timeout_seconds));

            let mut state = self.state();

            if let Some(reason) = state.receive_failures.remove(&call) {
                return Err(Error::receive(endpoint.as_str(), eyre::eyre!(reason)));
            }

            let messages = state
                .queues
                .get_mut(&name)
                .ok_or_else(|| Error::queue_not_found(&name))?;

            let mut batch = Vec::new();
            for stored in messages.iter_mut() {
                if batch.len() >= request.max_messages as usize {
                    break;
                }
                if !stored.is_visible(now) {
                    continue;
                }

                let receipt_handle = format!(
                    "{}-{}",
                    stored.id,
                    self.next_id.fetch_add(1, Ordering::Relaxed)
                );
                stored.receipt_handle = Some(receipt_handle.clone());
                stored.invisible_until = Some(invisible_until);

                batch.push(Message {
                    id: stored.id.clone(),
                    body: stored.body.clone(),
                    receipt_handle,
                    sent_timestamp: stored.sent_timestamp,
                });
            }

            Ok(batch)
        })
    }

    fn delete<'a>(
        &'a self,
        endpoint: &'a QueueEndpoint,
        message_id: &'a str,
        receipt_handle: &'a str,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.deletes.fetch_add(1, Ordering::Relaxed);

            let name = Self::queue_name(endpoint)?;
            let mut state = self.state();

            let messages = state
                .queues
                .get_mut(&name)
                .ok_or_else(|| Error::queue_not_found(&name))?;

            let position = messages
                .iter()
                .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
                .ok_or_else(|| {
                    Error::acknowledge(message_id, eyre::eyre!("Receipt handle is invalid"))
                })?;

            messages.remove(position);

            Ok(())
        })
    }
}
