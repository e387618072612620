//! Entities scheduled for persistence in one unit of work.

use herald_core::aggregate::ScheduledEntity;

/// Why an entity is part of the unit of work. Entities are drained in this
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    /// Scheduled for insertion.
    Insertion,
    /// Scheduled for update.
    Update,
    /// Scheduled for deletion.
    Deletion,
    /// Owner of a collection scheduled for deletion.
    CollectionDeletion,
    /// Owner of a collection scheduled for update.
    CollectionUpdate,
}

/// The scheduled entities of one unit of work, as reported by the host's
/// flush.
pub struct ChangeSet<'a, E> {
    scheduled: Vec<(ChangeKind, &'a mut dyn ScheduledEntity<E>)>,
}

impl<'a, E> ChangeSet<'a, E> {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scheduled: Vec::new(),
        }
    }

    /// Schedules `entity` under `kind`.
    pub fn schedule(
        &mut self,
        kind: ChangeKind,
        entity: &'a mut dyn ScheduledEntity<E>,
    ) -> &mut Self {
        self.scheduled.push((kind, entity));
        self
    }

    /// Schedules an inserted entity.
    pub fn insertion(&mut self, entity: &'a mut dyn ScheduledEntity<E>) -> &mut Self {
        self.schedule(ChangeKind::Insertion, entity)
    }

    /// Schedules an updated entity.
    pub fn update(&mut self, entity: &'a mut dyn ScheduledEntity<E>) -> &mut Self {
        self.schedule(ChangeKind::Update, entity)
    }

    /// Schedules a deleted entity.
    pub fn deletion(&mut self, entity: &'a mut dyn ScheduledEntity<E>) -> &mut Self {
        self.schedule(ChangeKind::Deletion, entity)
    }

    /// Schedules the owner of a deleted collection.
    pub fn collection_deletion(&mut self, owner: &'a mut dyn ScheduledEntity<E>) -> &mut Self {
        self.schedule(ChangeKind::CollectionDeletion, owner)
    }

    /// Schedules the owner of an updated collection.
    pub fn collection_update(&mut self, owner: &'a mut dyn ScheduledEntity<E>) -> &mut Self {
        self.schedule(ChangeKind::CollectionUpdate, owner)
    }

    /// Number of scheduled entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scheduled.len()
    }

    /// Whether nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }

    /// Entities grouped by [`ChangeKind`], scheduling order kept within each
    /// group.
    pub fn into_drain_order(
        self,
    ) -> impl Iterator<Item = (ChangeKind, &'a mut dyn ScheduledEntity<E>)> {
        let mut scheduled = self.scheduled;
        scheduled.sort_by_key(|(kind, _)| *kind);
        scheduled.into_iter()
    }
}

impl<E> Default for ChangeSet<'_, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for ChangeSet<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.scheduled.iter().map(|(kind, _)| kind))
            .finish()
    }
}
