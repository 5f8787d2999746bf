//! Collaborator-facing persistence contracts.
//!
//! The policy and tracker only see these traits. [`StateStore`](crate::StateStore)
//! is the redb implementation; tests and other backends can supply their own.

use pulse_core::{EntityAttributes, EntityId, SnapshotId};

use crate::error::StateResult;
use crate::types::{NewSnapshot, Snapshot};

/// Resolves external keys to stable entity ids.
pub trait EntityRegistry: Send + Sync {
    /// Normalize `key`, then return the matching entity id, creating the
    /// entity on first sight. Touches the last-observed time either way.
    ///
    /// Idempotent: concurrent calls with the same key yield the same id.
    fn resolve_or_create(
        &self,
        key: &str,
        attributes: Option<&EntityAttributes>,
    ) -> StateResult<EntityId>;
}

/// Append-only snapshot chains, one per entity.
pub trait SnapshotStore: Send + Sync {
    /// Most recent snapshot for the entity, or `None` if it has none yet.
    fn latest_snapshot(&self, entity_id: EntityId) -> StateResult<Option<Snapshot>>;

    /// Append a snapshot captured now.
    ///
    /// Fails with `UnknownEntity` for an unregistered id and with `StaleHead`
    /// when `snapshot.previous_snapshot_id` is not the current chain head.
    fn append(&self, entity_id: EntityId, snapshot: NewSnapshot) -> StateResult<SnapshotId>;
}

impl<T: EntityRegistry + ?Sized> EntityRegistry for std::sync::Arc<T> {
    fn resolve_or_create(
        &self,
        key: &str,
        attributes: Option<&EntityAttributes>,
    ) -> StateResult<EntityId> {
        (**self).resolve_or_create(key, attributes)
    }
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<T> {
    fn latest_snapshot(&self, entity_id: EntityId) -> StateResult<Option<Snapshot>> {
        (**self).latest_snapshot(entity_id)
    }

    fn append(&self, entity_id: EntityId, snapshot: NewSnapshot) -> StateResult<SnapshotId> {
        (**self).append(entity_id, snapshot)
    }
}
