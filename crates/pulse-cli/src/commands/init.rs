use std::path::Path;

use pulse_core::PulseConfig;

use crate::app::DEFAULT_CONFIG;

/// Default store file written into a fresh scaffold.
const DEFAULT_STORE: &str = "pulse.redb";

pub fn run(dir: &Path, db: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let output = dir.join(DEFAULT_CONFIG);
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let config = PulseConfig::scaffold(db.unwrap_or(Path::new(DEFAULT_STORE)));
    std::fs::create_dir_all(dir)?;
    std::fs::write(&output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), None, false).unwrap();

        let loaded = PulseConfig::from_file(&dir.path().join(DEFAULT_CONFIG)).unwrap();
        assert_eq!(loaded, PulseConfig::scaffold(Path::new(DEFAULT_STORE)));
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), None, false).unwrap();
        assert!(run(dir.path(), None, false).is_err());
        run(dir.path(), Some(Path::new("other.redb")), true).unwrap();

        let loaded = PulseConfig::from_file(&dir.path().join(DEFAULT_CONFIG)).unwrap();
        assert_eq!(loaded.store.path, Path::new("other.redb"));
    }
}
