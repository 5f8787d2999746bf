//! pulse-policy — incremental snapshot decisions.
//!
//! Given a fresh observation for an entity, decides whether a new
//! immutable snapshot must be written and records why.
//!
//! # Decision
//!
//! ```text
//! baseline = latest snapshot for entity
//!
//! if no baseline:
//!     create (first_snapshot)
//!
//! for each tracked metric:
//!     old == 0, new > 0  → changed, percent = 100.0
//!     old > 0            → percent = (new - old) / old * 100
//!                          changed if |percent| >= threshold * 100
//!
//! if any changed:
//!     create (metrics_changed)
//! elif now - baseline.captured_at > staleness_window:
//!     create (periodic_snapshot)
//! else:
//!     skip (no_significant_changes)
//! ```
//!
//! The [`Tracker`] wraps the decision in the resolve → decide → append
//! cycle and serializes that cycle per entity.

pub mod detector;
pub mod error;
pub mod policy;
pub mod tracker;

pub use detector::{ChangeDetector, ChangeSet, MetricDelta};
pub use error::{TrackError, TrackResult};
pub use policy::{Decision, SnapshotPolicy};
pub use tracker::{CycleOutcome, Tracker};
