//! Persisted records for the Pulse state store.
//!
//! Entities are mutable (last-observed time, attributes, active flag);
//! snapshots are written once and never touched again.

use serde::{Deserialize, Serialize};

use pulse_core::{
    EntityAttributes, EntityId, Metrics, SnapshotId, SnapshotReason, Timestamp,
};

// ── Entity ────────────────────────────────────────────────────────

/// A tracked external subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    /// Normalized (case-folded) external key. Unique.
    pub key: String,
    pub attributes: EntityAttributes,
    /// Inactive entities are kept but skipped by listings that ask for active only.
    pub active: bool,
    pub created_at: Timestamp,
    pub last_observed_at: Timestamp,
}

// ── Snapshot ──────────────────────────────────────────────────────

/// Immutable capture of an entity's metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub entity_id: EntityId,
    pub metrics: Metrics,
    pub captured_at: Timestamp,
    /// The snapshot this one follows, `None` for the first of the chain.
    pub previous_snapshot_id: Option<SnapshotId>,
    /// Caller-chosen flag (see `FlagPolicy`).
    pub flagged: bool,
    /// True only when a metric crossed the change threshold.
    pub change_detected: bool,
    pub reason: SnapshotReason,
    /// Opaque source payload kept for audit.
    pub payload: Option<serde_json::Value>,
}

/// Everything `append` needs from the caller. Id and capture time are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub metrics: Metrics,
    pub flagged: bool,
    pub change_detected: bool,
    pub reason: SnapshotReason,
    /// Expected current chain head. The append fails if the head moved.
    pub previous_snapshot_id: Option<SnapshotId>,
    pub payload: Option<serde_json::Value>,
}

impl NewSnapshot {
    pub fn new(metrics: Metrics, reason: SnapshotReason) -> Self {
        Self {
            metrics,
            flagged: reason != SnapshotReason::NoSignificantChanges,
            change_detected: reason == SnapshotReason::MetricsChanged,
            reason,
            previous_snapshot_id: None,
            payload: None,
        }
    }

    pub fn following(mut self, previous: Option<SnapshotId>) -> Self {
        self.previous_snapshot_id = previous;
        self
    }

    pub fn flagged(mut self, flagged: bool) -> Self {
        self.flagged = flagged;
        self
    }

    pub fn with_payload(mut self, payload: Option<serde_json::Value>) -> Self {
        self.payload = payload;
        self
    }
}

// ── Stats ─────────────────────────────────────────────────────────

/// Store-wide counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreStats {
    pub total_entities: u64,
    pub active_entities: u64,
    pub total_snapshots: u64,
    pub flagged_snapshots: u64,
    /// Snapshots written because a metric crossed the change threshold.
    pub changed_snapshots: u64,
    /// Snapshots captured at or after the `since` cut-off.
    pub snapshots_since: u64,
}
