//! pulse-state — embedded state store for Pulse.
//!
//! Backed by [redb](https://docs.rs/redb), provides the entity registry and
//! the append-only snapshot chains the snapshot policy reads from.
//!
//! # Architecture
//!
//! Entities and snapshots are JSON-serialized into redb's `&[u8]` value
//! columns, keyed by numeric id. A unique `entity_keys` index maps normalized
//! external keys to ids, and a `heads` table points each entity at its latest
//! snapshot. Each snapshot carries the id of the one before it, so a chain
//! is a plain id list rather than in-memory links.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across threads and blocking tasks.

pub mod contract;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use contract::{EntityRegistry, SnapshotStore};
pub use error::{ErrorKind, StateError, StateResult};
pub use store::StateStore;
pub use types::*;
