//! In-memory function configuration store.
//!
//! Conflicts and other update failures can be scripted to exercise the retry
//! path. Primarily used for testing.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use futures_util::future::BoxFuture;

use super::{FunctionConfigClient, FunctionConfiguration};
use crate::error::Error;

#[derive(Clone, Default)]
pub struct InMemoryConfigClient {
    functions: Arc<papaya::HashMap<String, FunctionConfiguration>>,
    pending_conflicts: Arc<AtomicU32>,
    reject_updates: Arc<AtomicBool>,
    reads: Arc<AtomicU32>,
    updates: Arc<AtomicU32>,
}

impl InMemoryConfigClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function with the given configuration.
    pub fn insert(&self, function: impl Into<String>, configuration: FunctionConfiguration) {
        self.functions.pin().insert(function.into(), configuration);
    }

    /// Current stored configuration of `function`.
    pub fn configuration(&self, function: &str) -> Option<FunctionConfiguration> {
        self.functions.pin().get(function).cloned()
    }

    /// Makes the next `count` updates fail with a conflict.
    pub fn conflict_next(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Makes every update fail with a non-conflict error.
    pub fn reject_updates(&self) {
        self.reject_updates.store(true, Ordering::SeqCst);
    }

    pub fn read_calls(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> u32 {
        self.updates.load(Ordering::SeqCst)
    }
}

impl FunctionConfigClient for InMemoryConfigClient {
    fn get_configuration<'a>(
        &'a self,
        function: &'a str,
    ) -> BoxFuture<'a, Result<FunctionConfiguration, Error>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);

            self.configuration(function).ok_or_else(|| {
                Error::configuration(function, eyre::eyre!("Function not found"))
            })
        })
    }

    fn update_configuration<'a>(
        &'a self,
        function: &'a str,
        configuration: FunctionConfiguration,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.updates.fetch_add(1, Ordering::SeqCst);

            if self.reject_updates.load(Ordering::SeqCst) {
                return Err(Error::configuration(function, eyre::eyre!("Access denied")));
            }

            let conflicted = self
                .pending_conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if conflicted {
                return Err(Error::conflict(
                    function,
                    "An update is in progress for this resource",
                ));
            }

            let functions = self.functions.pin();
            if !functions.contains_key(function) {
                return Err(Error::configuration(function, eyre::eyre!("Function not found")));
            }
            functions.insert(function.to_owned(), configuration);

            Ok(())
        })
    }
}
