use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use pulse_core::RawObservation;
use pulse_policy::{CycleOutcome, TrackResult};

use super::OutputFormat;
use crate::app::App;

/// Per-observation line of the ingest report.
#[derive(Debug, Serialize)]
struct IngestLine {
    index: usize,
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<CycleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct IngestSummary {
    created: usize,
    skipped: usize,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct IngestReport {
    summary: IngestSummary,
    results: Vec<IngestLine>,
}

/// Read observations from `path`: a JSON array, or JSON lines.
pub fn read_observations(path: &Path) -> anyhow::Result<Vec<RawObservation>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_observations(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_observations(content: &str) -> anyhow::Result<Vec<RawObservation>> {
    if content.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(content)?);
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", n + 1))
        })
        .collect()
}

pub async fn run(app: &App, file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let batch = read_observations(file)?;
    let report = process(app, batch).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", format_report(&report)),
    }
    Ok(())
}

/// Run the batch on the blocking pool, at most `ingest.concurrency` at a time.
async fn process(app: &App, batch: Vec<RawObservation>) -> anyhow::Result<IngestReport> {
    let tracker = Arc::new(app.tracker()?);
    let semaphore = Arc::new(Semaphore::new(app.config.ingest.concurrency));
    let total = batch.len();
    info!(total, concurrency = app.config.ingest.concurrency, "ingest started");

    let mut tasks: JoinSet<(usize, String, TrackResult<CycleOutcome>)> = JoinSet::new();
    for (index, raw) in batch.into_iter().enumerate() {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let tracker = Arc::clone(&tracker);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let key = raw.key.clone();
            (index, key, tracker.observe_raw(raw))
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(index, ..)| *index);

    let mut summary = IngestSummary::default();
    let results = results
        .into_iter()
        .map(|(index, key, result)| match result {
            Ok(outcome) => {
                if outcome.was_created() {
                    summary.created += 1;
                } else {
                    summary.skipped += 1;
                }
                IngestLine {
                    index,
                    key: outcome.key.clone(),
                    outcome: Some(outcome),
                    error: None,
                }
            }
            Err(e) => {
                warn!(index, %key, error = %e, "observation rejected");
                summary.failed += 1;
                IngestLine {
                    index,
                    key,
                    outcome: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();

    info!(
        created = summary.created,
        skipped = summary.skipped,
        failed = summary.failed,
        "ingest finished"
    );
    Ok(IngestReport { summary, results })
}

fn format_report(report: &IngestReport) -> String {
    let mut out = String::new();
    for line in &report.results {
        match (&line.outcome, &line.error) {
            (Some(outcome), _) => match outcome.snapshot_id {
                Some(id) => out.push_str(&format!(
                    "✓ {:<24} snapshot #{id} ({})\n",
                    line.key, outcome.decision.reason
                )),
                None => out.push_str(&format!("· {:<24} {}\n", line.key, outcome.decision.reason)),
            },
            (None, error) => out.push_str(&format!(
                "✗ {:<24} {}\n",
                line.key,
                error.as_deref().unwrap_or("unknown error")
            )),
        }
    }
    let s = &report.summary;
    out.push_str(&format!(
        "\n{} created, {} unchanged, {} failed\n",
        s.created, s.skipped, s.failed
    ));
    out
}
