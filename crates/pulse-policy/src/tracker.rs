//! Tracker — runs the resolve → decide → append cycle for observations.
//!
//! The decide/append pair for one entity runs under a per-entity lock, so
//! workers sharing a tracker never both extend a chain from the same
//! baseline. Across processes the store's compare-and-append check catches
//! the same race and reports it as `StaleHead`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use pulse_core::{EntityId, FlagPolicy, Observation, RawObservation, SnapshotId};
use pulse_state::{EntityRegistry, NewSnapshot, SnapshotStore};

use crate::error::TrackResult;
use crate::policy::{Decision, SnapshotPolicy};

/// Result of processing one observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub entity_id: EntityId,
    pub key: String,
    pub decision: Decision,
    /// Id of the snapshot written in this cycle, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<SnapshotId>,
}

impl CycleOutcome {
    pub fn was_created(&self) -> bool {
        self.snapshot_id.is_some()
    }

    pub fn change_detected(&self) -> bool {
        self.decision.change_detected()
    }
}

/// Per-entity mutexes, dropped again once nobody holds or waits on them.
#[derive(Default)]
struct EntityLocks {
    locks: Mutex<HashMap<EntityId, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    fn run<T>(&self, entity_id: EntityId, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(entity_id).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&entity_id);
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Drives observations through the registry, the policy and the store.
pub struct Tracker<S> {
    policy: SnapshotPolicy<S>,
    flag: FlagPolicy,
    locks: EntityLocks,
}

impl<S> Tracker<S>
where
    S: EntityRegistry + SnapshotStore,
{
    /// Create a tracker that persists the `snapshot_written` flag.
    pub fn new(policy: SnapshotPolicy<S>) -> Self {
        Self {
            policy,
            flag: FlagPolicy::default(),
            locks: EntityLocks::default(),
        }
    }

    /// Choose which signal lands in the persisted `flagged` column.
    pub fn with_flag_policy(mut self, flag: FlagPolicy) -> Self {
        self.flag = flag;
        self
    }

    pub fn policy(&self) -> &SnapshotPolicy<S> {
        &self.policy
    }

    /// Process one validated observation.
    pub fn observe(&self, observation: &Observation) -> TrackResult<CycleOutcome> {
        let store = self.policy.store();
        let entity_id = store.resolve_or_create(&observation.key, observation.attributes.as_ref())?;

        self.locks.run(entity_id, || -> TrackResult<CycleOutcome> {
            let decision = self.policy.decide(entity_id, &observation.metrics)?;

            let snapshot_id = if decision.should_create {
                let snapshot = NewSnapshot {
                    metrics: observation.metrics,
                    flagged: decision.flag(self.flag),
                    change_detected: decision.change_detected(),
                    reason: decision.reason,
                    previous_snapshot_id: decision.previous_snapshot_id,
                    payload: observation.payload.clone(),
                };
                let id = store.append(entity_id, snapshot)?;
                info!(
                    entity_id,
                    key = %observation.key,
                    snapshot_id = id,
                    reason = %decision.reason,
                    "snapshot created"
                );
                Some(id)
            } else {
                debug!(entity_id, key = %observation.key, "no new snapshot needed");
                None
            };

            Ok(CycleOutcome {
                entity_id,
                key: observation.key.clone(),
                decision,
                snapshot_id,
            })
        })
    }

    /// Validate and process a raw observation.
    pub fn observe_raw(&self, raw: RawObservation) -> TrackResult<CycleOutcome> {
        let observation = Observation::validate(raw)?;
        self.observe(&observation)
    }

    /// Process a batch in order. A failing observation is logged and
    /// reported in its slot; the rest of the batch still runs.
    pub fn observe_batch(&self, batch: Vec<RawObservation>) -> Vec<TrackResult<CycleOutcome>> {
        batch
            .into_iter()
            .map(|raw| {
                let key = raw.key.clone();
                let result = self.observe_raw(raw);
                if let Err(e) = &result {
                    warn!(%key, error = %e, "failed to process observation");
                }
                result
            })
            .collect()
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.len()
    }
}
