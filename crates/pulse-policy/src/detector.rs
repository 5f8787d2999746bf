//! Change detector — per-metric deltas between a baseline and a new observation.
//!
//! Pure: no I/O, no clock, no state. Safe to call from any thread.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use pulse_core::config::DEFAULT_CHANGE_THRESHOLD;
use pulse_core::{Metric, Metrics};

/// Movement of one metric between baseline and current.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub old: u64,
    pub new: u64,
    /// `new - old`.
    pub absolute: i64,
    /// Relative change in percent. Exactly 100.0 when `old` is zero.
    pub percent: f64,
}

/// Detector output: whether anything crossed the threshold, and by how much.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changed: bool,
    /// Only metrics that crossed the threshold appear here.
    pub deltas: BTreeMap<Metric, MetricDelta>,
}

/// Threshold-based change detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeDetector {
    /// Minimum relative change as a fraction (0.01 == 1%). Inclusive.
    threshold: f64,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_THRESHOLD)
    }
}

impl ChangeDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compare `current` against `baseline` over every tracked metric.
    ///
    /// - baseline 0, current > 0: recorded with `percent = 100.0`, changed.
    /// - baseline > 0: recorded and changed when `|percent| >= threshold * 100`.
    /// - baseline 0, current 0: ignored.
    pub fn compute(&self, current: &Metrics, baseline: &Metrics) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let threshold_pct = self.threshold * 100.0;

        for metric in Metric::ALL {
            let old = baseline.get(metric);
            let new = current.get(metric);

            let delta = if old == 0 {
                if new == 0 {
                    continue;
                }
                MetricDelta {
                    old,
                    new,
                    absolute: signed_delta(new, old),
                    percent: 100.0,
                }
            } else {
                let absolute = signed_delta(new, old);
                let percent = absolute as f64 / old as f64 * 100.0;
                if percent.abs() < threshold_pct {
                    continue;
                }
                MetricDelta {
                    old,
                    new,
                    absolute,
                    percent,
                }
            };

            changes.changed = true;
            changes.deltas.insert(metric, delta);
        }

        changes
    }
}

/// `new - old`, saturated to the `i64` range.
fn signed_delta(new: u64, old: u64) -> i64 {
    let diff = i128::from(new) - i128::from(old);
    i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
}
