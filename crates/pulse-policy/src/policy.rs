//! Snapshot policy — decides whether a new observation deserves a snapshot.
//!
//! Reads the baseline (latest snapshot) from the store, runs the change
//! detector against it, and falls back to a periodic snapshot once the
//! baseline is older than the staleness window. The policy never writes;
//! persisting is the caller's job.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use pulse_core::clock::{system_clock, SharedClock};
use pulse_core::config::DetectionConfig;
use pulse_core::{
    ConfigError, EntityId, FlagPolicy, Metric, Metrics, SnapshotId, SnapshotReason, Timestamp,
    SECS_PER_DAY,
};
use pulse_state::{Snapshot, SnapshotStore, StateResult};

use crate::detector::{ChangeDetector, MetricDelta};

/// Default staleness window: seven days.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(7 * SECS_PER_DAY);

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub should_create: bool,
    pub reason: SnapshotReason,
    /// Metrics that crossed the threshold. Set for `metrics_changed` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deltas: Option<BTreeMap<Metric, MetricDelta>>,
    /// Id of the baseline snapshot, whenever one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_snapshot_id: Option<SnapshotId>,
    /// Whole days since the baseline. Set for `periodic_snapshot` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_since_last: Option<u64>,
}

impl Decision {
    fn first() -> Self {
        Self {
            should_create: true,
            reason: SnapshotReason::FirstSnapshot,
            deltas: None,
            previous_snapshot_id: None,
            days_since_last: None,
        }
    }

    /// True only when a metric actually crossed the change threshold.
    pub fn change_detected(&self) -> bool {
        self.reason == SnapshotReason::MetricsChanged
    }

    /// Value for the persisted `flagged` column under the given policy.
    pub fn flag(&self, policy: FlagPolicy) -> bool {
        match policy {
            FlagPolicy::SnapshotWritten => self.reason != SnapshotReason::NoSignificantChanges,
            FlagPolicy::ChangeDetected => self.change_detected(),
        }
    }
}

/// Decision context: thresholds, staleness window, clock, and the store
/// the baseline is read from. Built explicitly and passed around; there is
/// no global instance.
#[derive(Clone)]
pub struct SnapshotPolicy<S> {
    store: S,
    detector: ChangeDetector,
    staleness: Duration,
    clock: SharedClock,
}

impl<S: SnapshotStore> SnapshotPolicy<S> {
    /// Create a policy with default threshold (1%) and staleness window (7 days).
    pub fn new(store: S) -> Self {
        Self {
            store,
            detector: ChangeDetector::default(),
            staleness: DEFAULT_STALENESS,
            clock: system_clock(),
        }
    }

    /// Build a policy from the `[detection]` config section.
    pub fn from_config(store: S, config: &DetectionConfig) -> Result<Self, ConfigError> {
        let threshold = config.change_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(Self::new(store)
            .with_threshold(threshold)
            .with_staleness(config.staleness()?))
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.detector = ChangeDetector::new(threshold);
        self
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// Decide for `entity_id` against its current baseline, as of now.
    pub fn decide(&self, entity_id: EntityId, current: &Metrics) -> StateResult<Decision> {
        self.decide_at(entity_id, current, self.clock.now())
    }

    /// Decide for `entity_id` as of `now`.
    pub fn decide_at(
        &self,
        entity_id: EntityId,
        current: &Metrics,
        now: Timestamp,
    ) -> StateResult<Decision> {
        let baseline = self.store.latest_snapshot(entity_id)?;
        let decision = self.evaluate(baseline.as_ref(), current, now);
        debug!(
            entity_id,
            reason = %decision.reason,
            should_create = decision.should_create,
            "snapshot decision"
        );
        Ok(decision)
    }

    /// Pure part of the decision, given an already-fetched baseline.
    pub fn evaluate(&self, baseline: Option<&Snapshot>, current: &Metrics, now: Timestamp) -> Decision {
        let Some(baseline) = baseline else {
            return Decision::first();
        };

        let changes = self.detector.compute(current, &baseline.metrics);
        if changes.changed {
            return Decision {
                should_create: true,
                reason: SnapshotReason::MetricsChanged,
                deltas: Some(changes.deltas),
                previous_snapshot_id: Some(baseline.id),
                days_since_last: None,
            };
        }

        // A baseline stamped in the future (clock skew) counts as fresh.
        let age = now.saturating_sub(baseline.captured_at);
        if age > self.staleness.as_secs() {
            return Decision {
                should_create: true,
                reason: SnapshotReason::PeriodicSnapshot,
                deltas: None,
                previous_snapshot_id: Some(baseline.id),
                days_since_last: Some(age / SECS_PER_DAY),
            };
        }

        Decision {
            should_create: false,
            reason: SnapshotReason::NoSignificantChanges,
            deltas: None,
            previous_snapshot_id: Some(baseline.id),
            days_since_last: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::ManualClock;
    use pulse_state::{NewSnapshot, StateStore};
    use std::sync::Arc;

    const T0: Timestamp = 1_700_000_000;

    fn test_metrics() -> Metrics {
        Metrics {
            followers: 1000,
            following: 100,
            likes: 5000,
            videos: 20,
        }
    }

    /// Store with one entity whose only snapshot was captured at T0.
    fn seeded(baseline: Metrics) -> (SnapshotPolicy<StateStore>, EntityId, SnapshotId) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = StateStore::open_in_memory().unwrap().with_clock(clock.clone());
        let entity = store.resolve_or_create("creator", None).unwrap();
        let snapshot = store
            .append(entity, NewSnapshot::new(baseline, SnapshotReason::FirstSnapshot))
            .unwrap();
        let policy = SnapshotPolicy::new(store).with_clock(clock);
        (policy, entity, snapshot)
    }

    #[test]
    fn first_snapshot_without_baseline() {
        let store = StateStore::open_in_memory().unwrap();
        let entity = store.resolve_or_create("creator", None).unwrap();
        let policy = SnapshotPolicy::new(store);

        let decision = policy.decide(entity, &test_metrics()).unwrap();
        assert!(decision.should_create);
        assert_eq!(decision.reason, SnapshotReason::FirstSnapshot);
        assert_eq!(decision.previous_snapshot_id, None);
        assert_eq!(decision.deltas, None);
    }

    #[test]
    fn one_percent_change_is_metrics_changed() {
        let (policy, entity, baseline_id) = seeded(test_metrics());
        let current = test_metrics().with(Metric::Followers, 1010);

        let decision = policy.decide_at(entity, &current, T0 + 3_600).unwrap();
        assert!(decision.should_create);
        assert_eq!(decision.reason, SnapshotReason::MetricsChanged);
        assert_eq!(decision.previous_snapshot_id, Some(baseline_id));
        let deltas = decision.deltas.unwrap();
        assert_eq!(deltas[&Metric::Followers].percent, 1.0);
        assert_eq!(deltas.len(), 1);
    }

    #[test]
    fn small_change_within_window_is_skipped() {
        let (policy, entity, _) = seeded(test_metrics());
        let current = test_metrics().with(Metric::Followers, 1005);

        let decision = policy
            .decide_at(entity, &current, T0 + 2 * SECS_PER_DAY)
            .unwrap();
        assert!(!decision.should_create);
        assert_eq!(decision.reason, SnapshotReason::NoSignificantChanges);
        assert_eq!(decision.days_since_last, None);
    }

    #[test]
    fn small_change_past_window_is_periodic() {
        let (policy, entity, baseline_id) = seeded(test_metrics());
        let current = test_metrics().with(Metric::Followers, 1005);

        let decision = policy
            .decide_at(entity, &current, T0 + 8 * SECS_PER_DAY)
            .unwrap();
        assert!(decision.should_create);
        assert_eq!(decision.reason, SnapshotReason::PeriodicSnapshot);
        assert_eq!(decision.days_since_last, Some(8));
        assert_eq!(decision.previous_snapshot_id, Some(baseline_id));
    }

    #[test]
    fn zero_baseline_metric_change() {
        let (policy, entity, _) = seeded(test_metrics().with(Metric::Likes, 0));
        let current = test_metrics().with(Metric::Likes, 50);

        let decision = policy.decide_at(entity, &current, T0 + 60).unwrap();
        assert_eq!(decision.reason, SnapshotReason::MetricsChanged);
        assert_eq!(
            decision.deltas.unwrap()[&Metric::Likes],
            MetricDelta {
                old: 0,
                new: 50,
                absolute: 50,
                percent: 100.0
            }
        );
    }

    #[test]
    fn staleness_boundary_is_exclusive() {
        let (policy, entity, _) = seeded(test_metrics());
        let window = policy.staleness().as_secs();

        let at_window = policy
            .decide_at(entity, &test_metrics(), T0 + window)
            .unwrap();
        assert_eq!(at_window.reason, SnapshotReason::NoSignificantChanges);

        let past_window = policy
            .decide_at(entity, &test_metrics(), T0 + window + 1)
            .unwrap();
        assert_eq!(past_window.reason, SnapshotReason::PeriodicSnapshot);
        assert_eq!(past_window.days_since_last, Some(7));
    }

    #[test]
    fn custom_staleness_and_threshold() {
        let (policy, entity, _) = seeded(test_metrics());
        let policy = policy
            .with_threshold(0.10)
            .with_staleness(Duration::from_secs(3_600));

        // 5% is under a 10% threshold.
        let current = test_metrics().with(Metric::Followers, 1050);
        let fresh = policy.decide_at(entity, &current, T0 + 3_600).unwrap();
        assert_eq!(fresh.reason, SnapshotReason::NoSignificantChanges);

        let stale = policy.decide_at(entity, &current, T0 + 3_601).unwrap();
        assert_eq!(stale.reason, SnapshotReason::PeriodicSnapshot);
        assert_eq!(stale.days_since_last, Some(0));
    }

    #[test]
    fn future_baseline_counts_as_fresh() {
        let (policy, entity, _) = seeded(test_metrics());
        let decision = policy.decide_at(entity, &test_metrics(), T0 - 10).unwrap();
        assert_eq!(decision.reason, SnapshotReason::NoSignificantChanges);
    }

    #[test]
    fn decide_is_idempotent() {
        let (policy, entity, _) = seeded(test_metrics());
        let current = test_metrics().with(Metric::Videos, 40);
        let first = policy.decide_at(entity, &current, T0 + 100).unwrap();
        let second = policy.decide_at(entity, &current, T0 + 100).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn decide_uses_policy_clock() {
        let clock = Arc::new(ManualClock::new(T0));
        let store = StateStore::open_in_memory().unwrap().with_clock(clock.clone());
        let entity = store.resolve_or_create("creator", None).unwrap();
        store
            .append(entity, NewSnapshot::new(test_metrics(), SnapshotReason::FirstSnapshot))
            .unwrap();
        let policy = SnapshotPolicy::new(store).with_clock(clock.clone());

        assert!(!policy.decide(entity, &test_metrics()).unwrap().should_create);
        clock.advance(8 * SECS_PER_DAY);
        let decision = policy.decide(entity, &test_metrics()).unwrap();
        assert_eq!(decision.reason, SnapshotReason::PeriodicSnapshot);
    }

    #[test]
    fn flag_policies_diverge_for_first_and_periodic() {
        let first = Decision::first();
        assert!(first.flag(FlagPolicy::SnapshotWritten));
        assert!(!first.flag(FlagPolicy::ChangeDetected));
        assert!(!first.change_detected());

        let skipped = Decision {
            should_create: false,
            reason: SnapshotReason::NoSignificantChanges,
            deltas: None,
            previous_snapshot_id: Some(1),
            days_since_last: None,
        };
        assert!(!skipped.flag(FlagPolicy::SnapshotWritten));
        assert!(!skipped.flag(FlagPolicy::ChangeDetected));
    }

    #[test]
    fn from_config_applies_detection_section() {
        let store = StateStore::open_in_memory().unwrap();
        let config = DetectionConfig {
            change_threshold: 0.05,
            staleness_window: "2d".to_string(),
            flag: FlagPolicy::ChangeDetected,
        };
        let policy = SnapshotPolicy::from_config(store, &config).unwrap();
        assert_eq!(policy.detector().threshold(), 0.05);
        assert_eq!(policy.staleness(), Duration::from_secs(2 * SECS_PER_DAY));

        let bad = DetectionConfig {
            change_threshold: f64::NAN,
            ..config
        };
        assert!(SnapshotPolicy::from_config(StateStore::open_in_memory().unwrap(), &bad).is_err());
    }

    #[test]
    fn decision_serializes_reason_and_deltas() {
        let (policy, entity, _) = seeded(test_metrics());
        let current = test_metrics().with(Metric::Followers, 2000);
        let decision = policy.decide_at(entity, &current, T0 + 1).unwrap();
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["reason"], "metrics_changed");
        assert_eq!(json["deltas"]["followers"]["percent"], 100.0);
        assert!(json.get("days_since_last").is_none());
    }
}
