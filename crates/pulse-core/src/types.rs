//! Shared types used across Pulse crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable internal identifier of a tracked entity.
pub type EntityId = u64;

/// Identifier of an immutable snapshot. Allocated in insertion order.
pub type SnapshotId = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Seconds in one day, used to report `days_since_last`.
pub const SECS_PER_DAY: u64 = 86_400;

// ── Metrics ──────────────────────────────────────────────────────

/// One of the tracked metrics. The set is fixed; every snapshot carries all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Followers,
    Following,
    Likes,
    Videos,
}

impl Metric {
    /// Every tracked metric, in reporting order.
    pub const ALL: [Metric; 4] = [
        Metric::Followers,
        Metric::Following,
        Metric::Likes,
        Metric::Videos,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Followers => "followers",
            Metric::Following => "following",
            Metric::Likes => "likes",
            Metric::Videos => "videos",
        }
    }

    /// Resolve a metric from its canonical name or the `*_count` column alias.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "followers" | "followers_count" => Some(Metric::Followers),
            "following" | "following_count" => Some(Metric::Following),
            "likes" | "likes_count" => Some(Metric::Likes),
            "videos" | "video_count" | "videos_count" => Some(Metric::Videos),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-shape metrics record.
///
/// A metric the source did not report is zero. There is no separate
/// "unknown" state: `Metrics::default()` is all zeros, and deserializing
/// a record with missing fields fills them with zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub followers: u64,
    pub following: u64,
    pub likes: u64,
    pub videos: u64,
}

impl Metrics {
    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Followers => self.followers,
            Metric::Following => self.following,
            Metric::Likes => self.likes,
            Metric::Videos => self.videos,
        }
    }

    pub fn set(&mut self, metric: Metric, value: u64) {
        match metric {
            Metric::Followers => self.followers = value,
            Metric::Following => self.following = value,
            Metric::Likes => self.likes = value,
            Metric::Videos => self.videos = value,
        }
    }

    /// Builder-style setter, handy for constructing records inline.
    pub fn with(mut self, metric: Metric, value: u64) -> Self {
        self.set(metric, value);
        self
    }

    /// Iterate `(metric, value)` pairs in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, u64)> + '_ {
        Metric::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}

// ── Entities ─────────────────────────────────────────────────────

/// Optional display attributes reported alongside an observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityAttributes {
    /// Identifier assigned by the upstream source, if any.
    pub external_id: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub verified: bool,
}

/// Normalize an external key: trim, drop one leading `@`, case-fold.
///
/// Returns `None` when nothing is left.
pub fn normalize_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

// ── Snapshot reasons ─────────────────────────────────────────────

/// Why the policy did (or did not) ask for a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    /// The entity had no snapshot yet.
    FirstSnapshot,
    /// At least one metric moved by the change threshold or more.
    MetricsChanged,
    /// Nothing moved, but the baseline is older than the staleness window.
    PeriodicSnapshot,
    /// Nothing moved and the baseline is fresh.
    NoSignificantChanges,
}

impl SnapshotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstSnapshot => "first_snapshot",
            Self::MetricsChanged => "metrics_changed",
            Self::PeriodicSnapshot => "periodic_snapshot",
            Self::NoSignificantChanges => "no_significant_changes",
        }
    }
}

impl fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_default_is_zero() {
        let m = Metrics::default();
        assert!(m.iter().all(|(_, v)| v == 0));
    }

    #[test]
    fn metrics_missing_fields_deserialize_as_zero() {
        let m: Metrics = serde_json::from_str(r#"{"followers": 12}"#).unwrap();
        assert_eq!(m.followers, 12);
        assert_eq!(m.likes, 0);
        assert_eq!(m.videos, 0);
    }

    #[test]
    fn metric_aliases_resolve() {
        assert_eq!(Metric::from_name("followers_count"), Some(Metric::Followers));
        assert_eq!(Metric::from_name("video_count"), Some(Metric::Videos));
        assert_eq!(Metric::from_name("likes"), Some(Metric::Likes));
        assert_eq!(Metric::from_name("shares"), None);
    }

    #[test]
    fn normalize_key_case_folds_and_strips_handle() {
        assert_eq!(normalize_key("  @TikTok ").as_deref(), Some("tiktok"));
        assert_eq!(normalize_key("Example_User").as_deref(), Some("example_user"));
        assert_eq!(normalize_key("@"), None);
        assert_eq!(normalize_key("   "), None);
    }

    #[test]
    fn reason_serializes_snake_case() {
        let json = serde_json::to_string(&SnapshotReason::NoSignificantChanges).unwrap();
        assert_eq!(json, "\"no_significant_changes\"");
        assert_eq!(SnapshotReason::PeriodicSnapshot.to_string(), "periodic_snapshot");
    }
}
