//! AWS SQS implementation of the queue client.

use aws_sdk_sqs::{
    error::SdkError, operation::get_queue_url::GetQueueUrlError,
    types::MessageSystemAttributeName,
};
use futures_util::future::BoxFuture;

use super::{DrainRequest, QueueClient, QueueEndpoint};
use crate::{error::Error, message::Message};

/// Queue client backed by Amazon SQS (or any SQS-compatible endpoint).
#[derive(Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }
}

fn to_i32(value: u32, name: &str) -> Result<i32, Error> {
    i32::try_from(value).map_err(|_| Error::invalid_parameter(format!("{name} out of range")))
}

fn get_queue_url_error(name: &str, e: SdkError<GetQueueUrlError>) -> Error {
    if e.as_service_error()
        .is_some_and(|e| e.is_queue_does_not_exist())
    {
        Error::queue_not_found(name)
    } else {
        Error::resolution(name, e)
    }
}

impl QueueClient for SqsQueue {
    fn resolve_endpoint<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<QueueEndpoint, Error>> {
        Box::pin(async move {
            let output = self
                .client
                .get_queue_url()
                .queue_name(name)
                .send()
                .await
                .map_err(|e| get_queue_url_error(name, e))?;

            let Some(url) = output.queue_url else {
                return Err(Error::queue_not_found(name));
            };

            QueueEndpoint::parse(&url)
        })
    }

    fn drain<'a>(
        &'a self,
        endpoint: &'a QueueEndpoint,
        request: DrainRequest,
    ) -> BoxFuture<'a, Result<Vec<Message>, Error>> {
        Box::pin(async move {
            let output = self
                .client
                .receive_message()
                .queue_url(endpoint.as_str())
                .max_number_of_messages(to_i32(request.max_messages, "max_messages")?)
                .visibility_timeout(to_i32(
                    request.visibility_timeout_seconds,
                    "visibility_timeout_seconds",
                )?)
                .wait_time_seconds(to_i32(request.wait_time_seconds, "wait_time_seconds")?)
                .message_system_attribute_names(MessageSystemAttributeName::All)
                .send()
                .await
                .map_err(|e| Error::receive(endpoint.as_str(), e))?;

            Ok(output
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(Message::from)
                .collect())
        })
    }

    fn delete<'a>(
        &'a self,
        endpoint: &'a QueueEndpoint,
        message_id: &'a str,
        receipt_handle: &'a str,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.client
                .delete_message()
                .queue_url(endpoint.as_str())
                .receipt_handle(receipt_handle)
                .send()
                .await
                .map_err(|e| Error::acknowledge(message_id, e))?;

            Ok(())
        })
    }
}
