use serde::Deserialize;

use crate::{message::PayloadFormat, redrive::RedriveConfig, retry::RetryPolicy};

/// Process configuration, read from `REDRIVE_*` environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// AWS region override; the default provider chain is used when absent.
    pub region: Option<String>,
    /// Custom service endpoint, e.g. a local SQS/Lambda emulator.
    pub endpoint_url: Option<String>,

    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout: u32,
    #[serde(default = "default_wait_time")]
    pub wait_time: u32,
    #[serde(default)]
    pub payload_format: PayloadFormat,

    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_retry_exponent_base")]
    pub retry_exponent_base: u32,
}

fn default_max_messages() -> u32 {
    10
}

fn default_visibility_timeout() -> u32 {
    40
}

fn default_wait_time() -> u32 {
    15
}

fn default_retry_limit() -> u32 {
    3
}

fn default_retry_exponent_base() -> u32 {
    2
}

impl Config {
    pub fn load() -> eyre::Result<Self> {
        Ok(envy::prefixed("REDRIVE_").from_env::<Self>()?)
    }

    /// Redrive parameters for a run that started at `run_start_time`, if given.
    pub fn redrive_config(&self, run_start_time: Option<i64>) -> RedriveConfig {
        RedriveConfig::builder()
            .max_messages(self.max_messages)
            .visibility_timeout_seconds(self.visibility_timeout)
            .wait_time_seconds(self.wait_time)
            .maybe_run_start_time(run_start_time)
            .payload_format(self.payload_format)
            .build()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .retry_limit(self.retry_limit)
            .exponent_base(self.retry_exponent_base)
            .build()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            max_messages: default_max_messages(),
            visibility_timeout: default_visibility_timeout(),
            wait_time: default_wait_time(),
            payload_format: PayloadFormat::default(),
            retry_limit: default_retry_limit(),
            retry_exponent_base: default_retry_exponent_base(),
        }
    }
}
