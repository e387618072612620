//! Detection and repair of stored events whose type name no longer
//! resolves.

use std::collections::BTreeMap;

use herald_core::codec::EventTypeResolver;
use herald_core::error::OutboxError;
use herald_core::store::EventStore;
use serde::Serialize;
use tracing::{error, info, warn};

/// What happened to one legacy type name during a fix run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LegacyFix {
    Renamed { from: String, to: String, rows: u64 },
    Deleted { type_name: String, rows: u64 },
    /// Not present in the legacy map.
    Unfixable { type_name: String },
    /// Mapped to nothing, but deletion was not requested.
    Kept { type_name: String },
}

/// Legacy event name checker, driven by an old-name to new-name map.
///
/// A map entry with no new name marks the type for deletion, which only
/// happens when `delete_unfixable` is set.
#[derive(Debug, Clone, Default)]
pub struct EventNameCheck {
    legacy_map: BTreeMap<String, Option<String>>,
    delete_unfixable: bool,
}

impl EventNameCheck {
    #[must_use]
    pub fn new(legacy_map: BTreeMap<String, Option<String>>) -> Self {
        Self {
            legacy_map,
            delete_unfixable: false,
        }
    }

    /// Allows rows mapped to no new name to be deleted.
    #[must_use]
    pub fn deleting_unfixable(mut self, delete: bool) -> Self {
        self.delete_unfixable = delete;
        self
    }

    /// Whether a fix run has any mapping to work from.
    #[must_use]
    pub fn can_fix(&self) -> bool {
        !self.legacy_map.is_empty()
    }

    /// Stored type names, sorted ascending, that `resolver` does not know.
    ///
    /// # Errors
    ///
    /// Propagates the store's `OutboxError`.
    pub async fn find_legacy_types<S>(
        &self,
        store: &mut S,
        resolver: &dyn EventTypeResolver,
    ) -> Result<Vec<String>, OutboxError>
    where
        S: EventStore + ?Sized,
    {
        let legacy: Vec<String> = store
            .type_names()
            .await?
            .into_iter()
            .filter(|name| !resolver.resolves(name))
            .collect();

        if legacy.is_empty() {
            info!("no legacy event types found");
        } else {
            warn!(count = legacy.len(), types = ?legacy, "legacy event types found");
        }
        Ok(legacy)
    }

    /// Applies the legacy map to each of `legacy`, in order.
    ///
    /// # Errors
    ///
    /// Propagates the store's `OutboxError`; fixes applied before the failure
    /// stay applied.
    pub async fn fix<S>(
        &self,
        store: &mut S,
        legacy: &[String],
    ) -> Result<Vec<LegacyFix>, OutboxError>
    where
        S: EventStore + ?Sized,
    {
        let mut fixes = Vec::with_capacity(legacy.len());
        for type_name in legacy {
            let fix = match self.legacy_map.get(type_name) {
                None => {
                    error!(type_name = %type_name, "cannot fix, not found in legacy map");
                    LegacyFix::Unfixable {
                        type_name: type_name.clone(),
                    }
                }
                Some(Some(to)) => {
                    let rows = store.rename_type(type_name, to).await?;
                    info!(from = %type_name, to = %to, rows, "renamed legacy event type");
                    LegacyFix::Renamed {
                        from: type_name.clone(),
                        to: to.clone(),
                        rows,
                    }
                }
                Some(None) if self.delete_unfixable => {
                    let rows = store.delete_type(type_name).await?;
                    warn!(type_name = %type_name, rows, "removed legacy event type");
                    LegacyFix::Deleted {
                        type_name: type_name.clone(),
                        rows,
                    }
                }
                Some(None) => LegacyFix::Kept {
                    type_name: type_name.clone(),
                },
            };
            fixes.push(fix);
        }
        Ok(fixes)
    }
}
