//! redb table definitions for the Pulse state store.
//!
//! Records are JSON-serialized into `&[u8]` value columns and keyed by their
//! numeric id. Indexes (`entity_keys`, `heads`, `sequences`) store plain ids.

use redb::TableDefinition;

/// Entities keyed by `{entity_id}`.
pub const ENTITIES: TableDefinition<u64, &[u8]> = TableDefinition::new("entities");

/// Unique index: normalized external key → entity id.
pub const ENTITY_KEYS: TableDefinition<&str, u64> = TableDefinition::new("entity_keys");

/// Snapshots keyed by `{snapshot_id}`. Append-only.
pub const SNAPSHOTS: TableDefinition<u64, &[u8]> = TableDefinition::new("snapshots");

/// Chain head: entity id → id of its latest snapshot.
pub const HEADS: TableDefinition<u64, u64> = TableDefinition::new("heads");

/// Id allocators keyed by sequence name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub const ENTITY_SEQ: &str = "entity";
pub const SNAPSHOT_SEQ: &str = "snapshot";
