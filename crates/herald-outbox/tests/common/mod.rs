//! Shared helpers for outbox integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use herald_core::codec::JsonEventCodec;
use herald_core::dispatcher::DomainEventDispatcher;
use herald_core::partition::{Partitions, StoragePartition};
use herald_outbox::application::persist_hook::PersistDomainEvents;
use herald_outbox::application::publish_hook::PublishDomainEvents;
use herald_outbox::domain::change_set::ChangeSet;
use herald_test_support::{
    FixedClock, InMemoryLockProvider, InMemoryPartition, TestEntity, TestEvent, fixed_now,
};

/// The three partitions of a two-tenant deployment.
pub struct Tenants {
    pub default: InMemoryPartition,
    pub tenant_a: InMemoryPartition,
    pub tenant_b: InMemoryPartition,
}

impl Tenants {
    pub fn new() -> Self {
        Self {
            default: InMemoryPartition::new("default"),
            tenant_a: InMemoryPartition::new("tenant_a"),
            tenant_b: InMemoryPartition::new("tenant_b"),
        }
    }

    pub fn registry(&self) -> Arc<Partitions> {
        Arc::new(
            Partitions::new()
                .with(Arc::new(self.default.clone()))
                .and_then(|p| p.with(Arc::new(self.tenant_a.clone())))
                .and_then(|p| p.with(Arc::new(self.tenant_b.clone())))
                .unwrap(),
        )
    }

    pub fn all(&self) -> [&InMemoryPartition; 3] {
        [&self.default, &self.tenant_a, &self.tenant_b]
    }
}

/// Persists `entity` through its own transaction against `partition`, the
/// way one flush of a unit of work would.
pub async fn persist(partition: &InMemoryPartition, entity: &mut TestEntity) {
    let hook = PersistDomainEvents::new(Arc::new(JsonEventCodec::<TestEvent>::new()));
    let mut tx = partition.begin().await.unwrap();
    let mut changes = ChangeSet::<TestEvent>::new();
    changes.insertion(entity);
    hook.on_flush(tx.as_mut(), changes).await.unwrap();
    tx.commit().await.unwrap();
}

pub fn publisher(
    tenants: &Tenants,
    dispatcher: Arc<dyn DomainEventDispatcher<TestEvent>>,
) -> PublishDomainEvents<TestEvent> {
    PublishDomainEvents::new(
        tenants.registry(),
        Arc::new(InMemoryLockProvider::new()),
        Arc::new(JsonEventCodec::<TestEvent>::new()),
        dispatcher,
        Arc::new(FixedClock(fixed_now())),
    )
}
