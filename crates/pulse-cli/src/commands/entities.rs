use tracing::info;

use super::OutputFormat;
use crate::app::App;

pub fn list(app: &App, all: bool, format: OutputFormat) -> anyhow::Result<()> {
    let entities = app.store.list_entities(!all)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entities)?),
        OutputFormat::Text => {
            for entity in &entities {
                let name = entity.attributes.display_name.as_deref().unwrap_or("-");
                let state = if entity.active { "active" } else { "inactive" };
                println!(
                    "#{:<6} {:<24} {:<24} {:<8} last seen {}",
                    entity.id, entity.key, name, state, entity.last_observed_at
                );
            }
            println!("{} entities", entities.len());
        }
    }
    Ok(())
}

pub fn set_active(app: &App, key: &str, active: bool) -> anyhow::Result<()> {
    let entity = app.store.set_active(key, active)?;
    info!(entity_id = entity.id, key = %entity.key, active, "entity updated");
    let verb = if active { "Activated" } else { "Deactivated" };
    println!("✓ {verb} {} (#{})", entity.key, entity.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{Metrics, Observation, PulseConfig};

    #[test]
    fn deactivate_hides_entity_from_active_listing() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(PulseConfig::scaffold(&dir.path().join("p.redb"))).unwrap();
        let tracker = app.tracker().unwrap();
        tracker.observe(&Observation::new("@Someone", Metrics::default()).unwrap()).unwrap();

        set_active(&app, "SOMEONE", false).unwrap();
        assert!(app.store.list_entities(true).unwrap().is_empty());
        assert_eq!(app.store.list_entities(false).unwrap().len(), 1);

        set_active(&app, "someone", true).unwrap();
        assert_eq!(app.store.list_entities(true).unwrap().len(), 1);

        assert!(set_active(&app, "nobody", false).is_err());
    }
}
