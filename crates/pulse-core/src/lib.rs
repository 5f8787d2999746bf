//! pulse-core — shared types for the Pulse snapshot engine.
//!
//! Holds the fixed-shape [`Metrics`] record, observation validation,
//! the `pulse.toml` configuration, and the clock abstraction used for
//! capture timestamps and staleness checks.

pub mod clock;
pub mod config;
pub mod error;
pub mod observation;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{FlagPolicy, PulseConfig};
pub use error::{ConfigError, ValidationError, ValidationResult};
pub use observation::{Observation, RawObservation};
pub use types::*;
