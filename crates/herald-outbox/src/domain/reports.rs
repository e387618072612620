//! Summaries returned by the hooks, for logging and assertions.

use serde::Serialize;

/// Outcome of one persist-on-commit run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    /// Entities whose pending events were drained.
    pub entities: usize,
    /// Records appended.
    pub appended: usize,
    /// Records written with replace semantics.
    pub replaced: usize,
}

/// Outcome of one publish-on-terminate pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Partitions scanned for unpublished records.
    pub partitions_visited: usize,
    /// Partitions skipped (non-relational, no schema, open transaction).
    pub partitions_skipped: usize,
    /// Records dispatched and marked published by this pass.
    pub published: usize,
    /// Records whose lock was held elsewhere.
    pub contended: usize,
    /// Records found published after taking the lock.
    pub already_published: usize,
    /// Records that disappeared between the scan and the lock.
    pub vanished: usize,
}
