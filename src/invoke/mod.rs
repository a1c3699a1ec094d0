//! Invocation of the redrive target.
//!
//! The redrive loop hands every eligible message body to an [`Invoker`] and
//! only deletes the message once the invoker reports [`InvocationOutcome::Accepted`].

use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::error::Error;

pub mod lambda;
pub mod memory;

/// Status code the invocation service returns when it queued an asynchronous invocation.
pub const ACCEPTED_STATUS: i32 = 202;

/// Result of an invocation call that reached the invocation service.
///
/// Transport and service errors are reported as [`Error::Invocation`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The target accepted the payload for asynchronous processing.
    Accepted,
    /// The service answered, but not with an acceptance.
    Rejected { status: i32 },
}

impl InvocationOutcome {
    pub fn from_status(status: i32) -> Self {
        if status == ACCEPTED_STATUS {
            Self::Accepted
        } else {
            Self::Rejected { status }
        }
    }
}

/// Core trait for invoking a compute target asynchronously.
pub trait Invoker: Send + Sync {
    /// Invokes `target` with `payload` without waiting for the target to finish.
    fn invoke_async<'a>(
        &'a self,
        target: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<InvocationOutcome, Error>>;
}
