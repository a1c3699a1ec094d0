//! Dead-letter queue redrive engine.
//!
//! [`redrive::Redriver`] drains a queue back into an invocation target and
//! reports what happened to every message. [`function::apply_configuration_change`]
//! applies a function configuration change, retrying through concurrent
//! modification conflicts. Both are generic over the service traits in
//! [`queue`], [`invoke`] and [`function`]; [`service::Service`] wires them to AWS.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

pub mod config;
pub mod error;
pub mod function;
pub mod invoke;
pub mod message;
pub mod queue;
pub mod redrive;
pub mod retry;
pub mod service;

pub use error::Error;
pub use redrive::{RedriveConfig, Redriver, RunStatistics};
pub use retry::{RetryPolicy, RetryState};

/// Installs the global tracing subscriber, filtered by `REDRIVE_LOG`.
///
/// Debug builds log in a human-readable format, release builds as JSON.
pub fn init_tracing() -> eyre::Result<()> {
    let filter = EnvFilter::builder()
        .with_env_var("REDRIVE_LOG")
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
        .try_init()?;

    Ok(())
}
