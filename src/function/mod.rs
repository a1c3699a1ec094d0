//! Function configuration changes under contention.
//!
//! A function's configuration can only be updated while no other update is in
//! progress; the service answers a concurrent update with a conflict. Changes
//! here are applied as read-modify-write cycles and retried through
//! [`retry_on_conflict`], so each retry merges against fresh remote state.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    retry::{retry_on_conflict, RetryPolicy, RetryState},
};

pub mod lambda;
pub mod memory;

/// The mutable part of a function's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfiguration {
    /// Environment variables, absent when the function has none configured.
    pub environment: Option<HashMap<String, String>>,
}

impl FunctionConfiguration {
    /// Sets a single environment variable, keeping all others.
    pub fn set_environment_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.environment
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
    }
}

/// Core trait for reading and writing function configuration.
pub trait FunctionConfigClient: Send + Sync {
    fn get_configuration<'a>(
        &'a self,
        function: &'a str,
    ) -> BoxFuture<'a, Result<FunctionConfiguration, Error>>;

    /// Replaces the function's configuration.
    ///
    /// Fails with [`Error::Conflict`] if another update is in progress, and with
    /// [`Error::Configuration`] for anything else.
    fn update_configuration<'a>(
        &'a self,
        function: &'a str,
        configuration: FunctionConfiguration,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

/// Applies `mutation` to the configuration of `function`, retrying on conflicts.
///
/// Every attempt reads the current configuration, applies `mutation` to it and
/// writes it back. Returns the number of retries it took.
#[tracing::instrument(skip(client, policy, mutation))]
pub async fn apply_configuration_change<C, M>(
    client: &C,
    policy: &RetryPolicy,
    function: &str,
    mutation: M,
) -> Result<u32, Error>
where
    C: FunctionConfigClient + ?Sized,
    M: Fn(&mut FunctionConfiguration),
{
    let mut state = RetryState::new();

    retry_on_conflict(policy, &mut state, || async {
        let mut configuration = client.get_configuration(function).await?;
        mutation(&mut configuration);

        tracing::info!("Updating function configuration");
        client.update_configuration(function, configuration).await
    })
    .await?;

    tracing::info!(retries = state.attempts(), "Updated function configuration");

    Ok(state.attempts())
}

/// Sets one environment variable on `function`, preserving the others.
pub async fn set_environment_variable<C>(
    client: &C,
    policy: &RetryPolicy,
    function: &str,
    name: &str,
    value: &str,
) -> Result<u32, Error>
where
    C: FunctionConfigClient + ?Sized,
{
    apply_configuration_change(client, policy, function, |configuration| {
        configuration.set_environment_variable(name, value)
    })
    .await
}
