//! AWS Lambda implementation of the function configuration client.

use aws_sdk_lambda::{
    error::{ProvideErrorMetadata, SdkError},
    operation::update_function_configuration::UpdateFunctionConfigurationError,
    types::Environment,
};
use futures_util::future::BoxFuture;

use super::{FunctionConfigClient, FunctionConfiguration};
use crate::error::Error;

#[derive(Clone)]
pub struct LambdaConfigClient {
    client: aws_sdk_lambda::Client,
}

impl LambdaConfigClient {
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        Self { client }
    }
}

/// A concurrent update surfaces as `ResourceConflictException` and is the only
/// failure reported as [`Error::Conflict`].
fn update_error(function: &str, e: SdkError<UpdateFunctionConfigurationError>) -> Error {
    let conflict = e
        .as_service_error()
        .filter(|service_error| service_error.is_resource_conflict_exception())
        .map(|service_error| {
            service_error
                .message()
                .unwrap_or("ResourceConflictException")
                .to_owned()
        });

    match conflict {
        Some(message) => Error::conflict(function, message),
        None => Error::configuration(function, e),
    }
}

impl FunctionConfigClient for LambdaConfigClient {
    fn get_configuration<'a>(
        &'a self,
        function: &'a str,
    ) -> BoxFuture<'a, Result<FunctionConfiguration, Error>> {
        Box::pin(async move {
            let output = self
                .client
                .get_function_configuration()
                .function_name(function)
                .send()
                .await
                .map_err(|e| Error::configuration(function, e))?;

            Ok(FunctionConfiguration {
                environment: output.environment.and_then(|env| env.variables),
            })
        })
    }

    fn update_configuration<'a>(
        &'a self,
        function: &'a str,
        configuration: FunctionConfiguration,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let environment = Environment::builder()
                .set_variables(configuration.environment)
                .build();

            self.client
                .update_function_configuration()
                .function_name(function)
                .environment(environment)
                .send()
                .await
                .map_err(|e| update_error(function, e))?;

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_lambda::{
        error::ErrorMetadata,
        types::error::{ResourceConflictException, ResourceNotFoundException},
    };
    use aws_smithy_runtime_api::http::{Response, StatusCode};
    use aws_smithy_types::body::SdkBody;

    use super::*;

    fn service_error(
        error: UpdateFunctionConfigurationError,
        status: u16,
    ) -> SdkError<UpdateFunctionConfigurationError> {
        SdkError::service_error(
            error,
            Response::new(StatusCode::try_from(status).unwrap(), SdkBody::empty()),
        )
    }

    #[test]
    fn test_resource_conflict_is_conflict() {
        let error = update_error(
            "orders-handler",
            service_error(
                UpdateFunctionConfigurationError::ResourceConflictException(
                    ResourceConflictException::builder()
                        .message("An update is in progress")
                        .build(),
                ),
                409,
            ),
        );

        match error {
            Error::Conflict { function, message } => {
                assert_eq!(function, "orders-handler");
                assert_eq!(message, "An update is in progress");
            }
            other => panic!("Expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_resource_conflict_without_message() {
        let error = update_error(
            "orders-handler",
            service_error(
                UpdateFunctionConfigurationError::ResourceConflictException(
                    ResourceConflictException::builder().build(),
                ),
                409,
            ),
        );

        assert!(error.is_conflict());
    }

    #[test]
    fn test_other_service_errors_are_configuration_errors() {
        let not_found = update_error(
            "orders-handler",
            service_error(
                UpdateFunctionConfigurationError::ResourceNotFoundException(
                    ResourceNotFoundException::builder()
                        .message("Function not found")
                        .build(),
                ),
                404,
            ),
        );
        assert!(matches!(not_found, Error::Configuration { .. }));

        let throttled = update_error(
            "orders-handler",
            service_error(
                UpdateFunctionConfigurationError::generic(
                    ErrorMetadata::builder()
                        .code("TooManyRequestsException")
                        .message("Rate exceeded")
                        .build(),
                ),
                429,
            ),
        );
        assert!(matches!(throttled, Error::Configuration { .. }));
        assert!(!throttled.is_conflict());
    }
}
