//! Test dispatchers: `DomainEventDispatcher` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use herald_core::dispatcher::DomainEventDispatcher;
use herald_core::error::OutboxError;

/// A dispatcher that records every event it receives.
#[derive(Debug)]
pub struct RecordingDispatcher<E> {
    dispatched: Mutex<Vec<E>>,
    yield_before_recording: bool,
}

impl<E: Clone> RecordingDispatcher<E> {
    /// Creates a dispatcher that records synchronously.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            yield_before_recording: false,
        }
    }

    /// Creates a dispatcher that yields to the runtime before recording, so
    /// that concurrently joined publish passes interleave mid-dispatch.
    #[must_use]
    pub fn yielding() -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            yield_before_recording: true,
        }
    }

    /// Returns a snapshot of every dispatched event.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn dispatched(&self) -> Vec<E> {
        self.dispatched.lock().unwrap().clone()
    }
}

impl<E: Clone> Default for RecordingDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> DomainEventDispatcher<E> for RecordingDispatcher<E>
where
    E: Send + 'static,
{
    async fn dispatch(&self, event: E) -> Result<(), OutboxError> {
        if self.yield_before_recording {
            tokio::task::yield_now().await;
        }
        self.dispatched.lock().unwrap().push(event);
        Ok(())
    }
}

/// A dispatcher whose subscriber always fails.
#[derive(Debug)]
pub struct FailingDispatcher;

#[async_trait]
impl<E> DomainEventDispatcher<E> for FailingDispatcher
where
    E: Send + 'static,
{
    async fn dispatch(&self, _event: E) -> Result<(), OutboxError> {
        Err(OutboxError::Dispatch("subscriber failed".into()))
    }
}

/// A dispatcher whose subscriber never returns. Wrap the pass in a timeout
/// to model a cancelled request.
#[derive(Debug)]
pub struct StalledDispatcher;

#[async_trait]
impl<E> DomainEventDispatcher<E> for StalledDispatcher
where
    E: Send + 'static,
{
    async fn dispatch(&self, _event: E) -> Result<(), OutboxError> {
        std::future::pending().await
    }
}
