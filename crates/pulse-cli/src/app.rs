//! Process-wide context for a single CLI invocation.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use pulse_core::PulseConfig;
use pulse_policy::{SnapshotPolicy, Tracker};
use pulse_state::StateStore;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG: &str = "pulse.toml";

/// Loaded config plus the opened store.
pub struct App {
    pub config: PulseConfig,
    pub store: StateStore,
}

impl App {
    /// Open the store named by `config`.
    pub fn open(config: PulseConfig) -> anyhow::Result<Self> {
        let path = &config.store.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let store = StateStore::open(path)
            .with_context(|| format!("failed to open store at {}", path.display()))?;
        info!(path = ?path, "state store opened");
        Ok(Self { config, store })
    }

    /// Build a tracker from the `[detection]` section.
    pub fn tracker(&self) -> anyhow::Result<Tracker<StateStore>> {
        let detection = &self.config.detection;
        let policy = SnapshotPolicy::from_config(self.store.clone(), detection)?;
        Ok(Tracker::new(policy).with_flag_policy(detection.flag))
    }
}

/// Load the config file, falling back to defaults when no file is present.
///
/// An explicitly named file must exist. `db` overrides `[store] path`.
pub fn load_config(config: Option<&Path>, db: Option<PathBuf>) -> anyhow::Result<PulseConfig> {
    let mut loaded = match config {
        Some(path) => PulseConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => PulseConfig::from_file(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("failed to load config {DEFAULT_CONFIG}"))?,
        None => PulseConfig::default(),
    };
    if let Some(db) = db {
        loaded.store.path = db;
    }
    Ok(loaded)
}
