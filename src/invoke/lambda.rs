//! AWS Lambda implementation of the invoker.

use aws_sdk_lambda::{primitives::Blob, types::InvocationType};
use bytes::Bytes;
use futures_util::future::BoxFuture;

use super::{InvocationOutcome, Invoker};
use crate::error::Error;

/// Invokes Lambda functions with the `Event` invocation type.
#[derive(Clone)]
pub struct LambdaInvoker {
    client: aws_sdk_lambda::Client,
}

impl LambdaInvoker {
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        Self { client }
    }
}

impl Invoker for LambdaInvoker {
    fn invoke_async<'a>(
        &'a self,
        target: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<InvocationOutcome, Error>> {
        Box::pin(async move {
            let output = self
                .client
                .invoke()
                .function_name(target)
                .invocation_type(InvocationType::Event)
                .payload(Blob::new(payload.to_vec()))
                .send()
                .await
                .map_err(|e| Error::invocation(target, e))?;

            if let Some(function_error) = output.function_error() {
                tracing::warn!(
                    function = target,
                    function_error,
                    "Invocation reported a function error"
                );
                return Ok(InvocationOutcome::Rejected {
                    status: output.status_code(),
                });
            }

            Ok(InvocationOutcome::from_status(output.status_code()))
        })
    }
}
