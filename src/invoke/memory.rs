//! Recording invoker used for testing and dry runs.
//!
//! Every call is recorded. Payloads can be scripted to be rejected or to fail;
//! everything else is accepted.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures_util::future::BoxFuture;

use super::{InvocationOutcome, Invoker};
use crate::error::Error;

#[derive(Clone, Copy)]
enum Script {
    Reject(i32),
    Fail,
}

/// A single recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub target: String,
    pub payload: Bytes,
}

#[derive(Clone, Default)]
pub struct RecordingInvoker {
    calls: Arc<Mutex<Vec<Invocation>>>,
    scripts: Arc<papaya::HashMap<Bytes, Script>>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    fn calls_guard(&self) -> MutexGuard<'_, Vec<Invocation>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answers invocations carrying `payload` with a non-accepted `status`.
    pub fn reject(&self, payload: impl Into<Bytes>, status: i32) {
        self.scripts.pin().insert(payload.into(), Script::Reject(status));
    }

    /// Fails invocations carrying `payload` with an invocation error.
    pub fn fail(&self, payload: impl Into<Bytes>) {
        self.scripts.pin().insert(payload.into(), Script::Fail);
    }

    /// All invocations made so far, in call order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls_guard().clone()
    }

    /// Payloads of all invocations made so far, in call order.
    pub fn payloads(&self) -> Vec<Bytes> {
        self.calls_guard().iter().map(|c| c.payload.clone()).collect()
    }
}

impl Invoker for RecordingInvoker {
    fn invoke_async<'a>(
        &'a self,
        target: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<InvocationOutcome, Error>> {
        Box::pin(async move {
            let script = self.scripts.pin().get(&payload).copied();

            self.calls_guard().push(Invocation {
                target: target.to_owned(),
                payload,
            });

            match script {
                None => Ok(InvocationOutcome::Accepted),
                Some(Script::Reject(status)) => Ok(InvocationOutcome::Rejected { status }),
                Some(Script::Fail) => Err(Error::invocation(
                    target,
                    eyre::eyre!("Service unavailable"),
                )),
            }
        })
    }
}
