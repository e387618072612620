//! Shared test doubles and fixtures for the Herald outbox.

mod clock;
mod dispatcher;
mod fixtures;
mod lock;
mod partition;

pub use clock::{FixedClock, SteppingClock};
pub use dispatcher::{FailingDispatcher, RecordingDispatcher, StalledDispatcher};
pub use fixtures::{PlainEntity, TestEntity, TestEvent, TestEventKind, fixed_now};
pub use lock::InMemoryLockProvider;
pub use partition::{InMemoryEventStore, InMemoryPartition, InMemoryTransaction};
