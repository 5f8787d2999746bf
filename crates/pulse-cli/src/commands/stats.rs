use serde::Serialize;

use pulse_core::config::parse_duration;
use pulse_state::StoreStats;

use super::OutputFormat;
use crate::app::App;

#[derive(Serialize)]
struct StatsReport {
    #[serde(flatten)]
    stats: StoreStats,
    since: String,
}

pub fn run(app: &App, since: &str, format: OutputFormat) -> anyhow::Result<()> {
    let window = parse_duration(since)?;
    let cutoff = app.store.clock().now().saturating_sub(window.as_secs());
    let stats = app.store.stats(cutoff)?;

    match format {
        OutputFormat::Json => {
            let report = StatsReport { stats, since: since.to_string() };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print!("{}", format_stats(&stats, since)),
    }
    Ok(())
}

fn format_stats(stats: &StoreStats, since: &str) -> String {
    format!(
        "Entities:   {} ({} active)\n\
         Snapshots:  {} ({} flagged, {} with metric changes)\n\
         Last {since}: {} snapshots\n",
        stats.total_entities,
        stats.active_entities,
        stats.total_snapshots,
        stats.flagged_snapshots,
        stats.changed_snapshots,
        stats.snapshots_since,
    )
}
