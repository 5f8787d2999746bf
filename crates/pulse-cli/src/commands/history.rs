use pulse_state::Snapshot;

use super::OutputFormat;
use crate::app::App;

pub fn run(app: &App, key: &str, limit: usize, format: OutputFormat) -> anyhow::Result<()> {
    let Some(entity) = app.store.get_entity_by_key(key)? else {
        anyhow::bail!("unknown entity: {key}");
    };
    let history = app.store.history(entity.id, limit)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&history)?),
        OutputFormat::Text => {
            println!("{} (entity #{}, {} shown)", entity.key, entity.id, history.len());
            for snapshot in &history {
                println!("{}", format_snapshot(snapshot));
            }
        }
    }
    Ok(())
}

fn format_snapshot(s: &Snapshot) -> String {
    let m = &s.metrics;
    let marker = if s.flagged { '*' } else { ' ' };
    format!(
        "{marker} #{:<6} at {:<11} followers={} following={} likes={} videos={}  {}",
        s.id, s.captured_at, m.followers, m.following, m.likes, m.videos, s.reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{Metrics, SnapshotReason};

    #[test]
    fn formats_one_line_per_snapshot() {
        let snapshot = Snapshot {
            id: 7,
            entity_id: 1,
            metrics: Metrics { followers: 10, following: 2, likes: 30, videos: 4 },
            captured_at: 1_700_000_000,
            previous_snapshot_id: Some(3),
            flagged: true,
            change_detected: true,
            reason: SnapshotReason::MetricsChanged,
            payload: None,
        };
        let line = format_snapshot(&snapshot);
        assert!(line.starts_with("* #7"));
        assert!(line.contains("followers=10"));
        assert!(line.ends_with("metrics_changed"));
    }

    #[test]
    fn unknown_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(pulse_core::PulseConfig::scaffold(&dir.path().join("p.redb"))).unwrap();
        assert!(run(&app, "nobody", 10, OutputFormat::Text).is_err());
    }
}
