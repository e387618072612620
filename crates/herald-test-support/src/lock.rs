//! Test lock provider: in-process `LockProvider` for tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use herald_core::error::OutboxError;
use herald_core::lock::LockProvider;

/// A lock provider backed by a shared in-memory set. Share one instance (via
/// `Arc`) between publishers to model processes contending for locks.
#[derive(Debug, Default)]
pub struct InMemoryLockProvider {
    held: Mutex<HashSet<String>>,
    releases: Mutex<Vec<String>>,
}

impl InMemoryLockProvider {
    /// Creates a provider with no held locks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `name` as held by some other process.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn hold(&self, name: &str) {
        self.held.lock().unwrap().insert(name.to_owned());
    }

    /// Whether `name` is currently held.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn is_held(&self, name: &str) -> bool {
        self.held.lock().unwrap().contains(name)
    }

    /// Names released so far, in release order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn releases(&self) -> Vec<String> {
        self.releases.lock().unwrap().clone()
    }
}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn acquire(&self, name: &str) -> Result<bool, OutboxError> {
        Ok(self.held.lock().unwrap().insert(name.to_owned()))
    }

    async fn release(&self, name: &str) -> Result<(), OutboxError> {
        self.held.lock().unwrap().remove(name);
        self.releases.lock().unwrap().push(name.to_owned());
        Ok(())
    }
}
