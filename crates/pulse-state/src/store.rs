//! StateStore — redb-backed entity registry and snapshot store.
//!
//! Entities and snapshots are JSON-serialized into redb's `&[u8]` value
//! columns. Every snapshot append runs in one write transaction that checks
//! the caller's expected chain head, so two writers racing on the same
//! entity cannot both extend the chain from the same baseline.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, Table, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use pulse_core::clock::{system_clock, SharedClock};
use pulse_core::{normalize_key, EntityAttributes, EntityId, SnapshotId, Timestamp};

use crate::contract::{EntityRegistry, SnapshotStore};
use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    clock: SharedClock,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            clock: system_clock(),
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            clock: system_clock(),
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Replace the time source used for capture and last-observed timestamps.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// The time source this store stamps records with.
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        txn.open_table(ENTITY_KEYS).map_err(map_err!(Table))?;
        txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        txn.open_table(HEADS).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Entities ───────────────────────────────────────────────────

    /// Resolve a key to its entity id, creating the entity on first sight.
    ///
    /// The lookup, touch and insert share one write transaction. redb
    /// serializes writers, so two concurrent calls for the same key see
    /// each other's insert and never create a duplicate.
    pub fn resolve_or_create(
        &self,
        key: &str,
        attributes: Option<&EntityAttributes>,
    ) -> StateResult<EntityId> {
        let normalized = normalize_key(key).ok_or_else(|| StateError::InvalidKey(key.to_string()))?;
        let now = self.clock.now();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let (id, created) = {
            let mut keys = txn.open_table(ENTITY_KEYS).map_err(map_err!(Table))?;
            let mut entities = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
            let existing = keys
                .get(normalized.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value());
            match existing {
                Some(id) => {
                    let mut entity: Entity = read_json(&entities, id)?.ok_or_else(|| {
                        StateError::Corrupt(format!("key {normalized} points at missing entity {id}"))
                    })?;
                    entity.last_observed_at = now;
                    if let Some(attrs) = attributes {
                        entity.attributes = attrs.clone();
                    }
                    write_json(&mut entities, id, &entity)?;
                    (id, false)
                }
                None => {
                    let id = next_id(&txn, ENTITY_SEQ)?;
                    let entity = Entity {
                        id,
                        key: normalized.clone(),
                        attributes: attributes.cloned().unwrap_or_default(),
                        active: true,
                        created_at: now,
                        last_observed_at: now,
                    };
                    write_json(&mut entities, id, &entity)?;
                    keys.insert(normalized.as_str(), id)
                        .map_err(map_err!(Write))?;
                    (id, true)
                }
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(entity_id = id, key = %normalized, created, "entity resolved");
        Ok(id)
    }

    /// Get an entity by id.
    pub fn get_entity(&self, entity_id: EntityId) -> StateResult<Option<Entity>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        read_json(&table, entity_id)
    }

    /// Get an entity by external key (normalized before lookup).
    pub fn get_entity_by_key(&self, key: &str) -> StateResult<Option<Entity>> {
        let Some(normalized) = normalize_key(key) else {
            return Ok(None);
        };
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let keys = txn.open_table(ENTITY_KEYS).map_err(map_err!(Table))?;
        let Some(id) = keys
            .get(normalized.as_str())
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
        else {
            return Ok(None);
        };
        let entities = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        read_json(&entities, id)
    }

    /// List entities in id order, optionally only the active ones.
    pub fn list_entities(&self, active_only: bool) -> StateResult<Vec<Entity>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let entity: Entity =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if !active_only || entity.active {
                results.push(entity);
            }
        }
        Ok(results)
    }

    /// Flip the active flag of an entity. Entities are never deleted.
    pub fn set_active(&self, key: &str, active: bool) -> StateResult<Entity> {
        let normalized = normalize_key(key).ok_or_else(|| StateError::InvalidKey(key.to_string()))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let entity = {
            let keys = txn.open_table(ENTITY_KEYS).map_err(map_err!(Table))?;
            let mut entities = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
            let id = keys
                .get(normalized.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .ok_or_else(|| StateError::UnknownKey(normalized.clone()))?;
            let mut entity: Entity = read_json(&entities, id)?
                .ok_or_else(|| StateError::Corrupt(format!("key {normalized} points at missing entity {id}")))?;
            entity.active = active;
            write_json(&mut entities, id, &entity)?;
            entity
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(entity_id = entity.id, key = %normalized, active, "entity active flag set");
        Ok(entity)
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Most recent snapshot for an entity (the chain head).
    pub fn latest_snapshot(&self, entity_id: EntityId) -> StateResult<Option<Snapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let heads = txn.open_table(HEADS).map_err(map_err!(Table))?;
        let Some(head) = heads
            .get(entity_id)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
        else {
            return Ok(None);
        };
        let snapshots = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        read_json::<Snapshot, _>(&snapshots, head)?
            .map(Some)
            .ok_or_else(|| StateError::Corrupt(format!("head of entity {entity_id} points at missing snapshot {head}")))
    }

    /// Append a snapshot captured now (per the store clock).
    pub fn append(&self, entity_id: EntityId, snapshot: NewSnapshot) -> StateResult<SnapshotId> {
        self.append_at(entity_id, snapshot, self.clock.now())
    }

    /// Append a snapshot with an explicit capture time.
    ///
    /// Rejects unknown entities, a stale expected head, and a capture time
    /// earlier than the current head's.
    pub fn append_at(
        &self,
        entity_id: EntityId,
        snapshot: NewSnapshot,
        captured_at: Timestamp,
    ) -> StateResult<SnapshotId> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let id = {
            let entities = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
            if entities.get(entity_id).map_err(map_err!(Read))?.is_none() {
                return Err(StateError::UnknownEntity(entity_id));
            }

            let mut heads = txn.open_table(HEADS).map_err(map_err!(Table))?;
            let mut snapshots = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
            let head = heads
                .get(entity_id)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value());
            if head != snapshot.previous_snapshot_id {
                return Err(StateError::StaleHead {
                    entity_id,
                    expected: snapshot.previous_snapshot_id,
                    actual: head,
                });
            }
            if let Some(head_id) = head {
                let head_snapshot: Snapshot = read_json(&snapshots, head_id)?.ok_or_else(|| {
                    StateError::Corrupt(format!("head of entity {entity_id} points at missing snapshot {head_id}"))
                })?;
                if captured_at < head_snapshot.captured_at {
                    return Err(StateError::OutOfOrder {
                        entity_id,
                        head_captured_at: head_snapshot.captured_at,
                        captured_at,
                    });
                }
            }

            let id = next_id(&txn, SNAPSHOT_SEQ)?;
            let record = Snapshot {
                id,
                entity_id,
                metrics: snapshot.metrics,
                captured_at,
                previous_snapshot_id: head,
                flagged: snapshot.flagged,
                change_detected: snapshot.change_detected,
                reason: snapshot.reason,
                payload: snapshot.payload,
            };
            write_json(&mut snapshots, id, &record)?;
            heads.insert(entity_id, id).map_err(map_err!(Write))?;
            id
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(entity_id, snapshot_id = id, captured_at, "snapshot appended");
        Ok(id)
    }

    /// Get a snapshot by id.
    pub fn get_snapshot(&self, snapshot_id: SnapshotId) -> StateResult<Option<Snapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        read_json(&table, snapshot_id)
    }

    /// Walk an entity's chain from the head back, newest first, up to `limit`.
    pub fn history(&self, entity_id: EntityId, limit: usize) -> StateResult<Vec<Snapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let heads = txn.open_table(HEADS).map_err(map_err!(Table))?;
        let snapshots = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        let mut next = heads
            .get(entity_id)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value());
        let mut results = Vec::new();
        while let Some(id) = next {
            if results.len() >= limit {
                break;
            }
            let snapshot: Snapshot = read_json(&snapshots, id)?
                .ok_or_else(|| StateError::Corrupt(format!("chain of entity {entity_id} points at missing snapshot {id}")))?;
            // Ids are allocated in insertion order, so a chain must strictly descend.
            if snapshot.previous_snapshot_id.is_some_and(|prev| prev >= id) {
                return Err(StateError::Corrupt(format!("snapshot {id} links forward")));
            }
            next = snapshot.previous_snapshot_id;
            results.push(snapshot);
        }
        Ok(results)
    }

    // ── Stats ──────────────────────────────────────────────────────

    /// Count entities and snapshots; `since` bounds `snapshots_since`.
    pub fn stats(&self, since: Timestamp) -> StateResult<StoreStats> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let mut stats = StoreStats::default();

        let entities = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        for entry in entities.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let entity: Entity =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            stats.total_entities += 1;
            if entity.active {
                stats.active_entities += 1;
            }
        }

        let snapshots = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        for entry in snapshots.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let snapshot: Snapshot =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            stats.total_snapshots += 1;
            if snapshot.flagged {
                stats.flagged_snapshots += 1;
            }
            if snapshot.change_detected {
                stats.changed_snapshots += 1;
            }
            if snapshot.captured_at >= since {
                stats.snapshots_since += 1;
            }
        }
        Ok(stats)
    }
}

impl EntityRegistry for StateStore {
    fn resolve_or_create(
        &self,
        key: &str,
        attributes: Option<&EntityAttributes>,
    ) -> StateResult<EntityId> {
        StateStore::resolve_or_create(self, key, attributes)
    }
}

impl SnapshotStore for StateStore {
    fn latest_snapshot(&self, entity_id: EntityId) -> StateResult<Option<Snapshot>> {
        StateStore::latest_snapshot(self, entity_id)
    }

    fn append(&self, entity_id: EntityId, snapshot: NewSnapshot) -> StateResult<SnapshotId> {
        StateStore::append(self, entity_id, snapshot)
    }
}

// ── Helpers ───────────────────────────────────────────────────────

/// Allocate the next id of a sequence. Ids start at 1.
fn next_id(txn: &WriteTransaction, sequence: &str) -> StateResult<u64> {
    let mut table = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
    let next = table
        .get(sequence)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0)
        + 1;
    table.insert(sequence, next).map_err(map_err!(Write))?;
    Ok(next)
}

fn read_json<T, R>(table: &R, id: u64) -> StateResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id).map_err(map_err!(Read))? {
        Some(guard) => {
            let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn write_json<T: Serialize>(
    table: &mut Table<'_, u64, &'static [u8]>,
    id: u64,
    value: &T,
) -> StateResult<()> {
    let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
    table
        .insert(id, bytes.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}
