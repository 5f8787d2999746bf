//! `pulse` — feeds observations through the snapshot tracker and reports
//! on the stored snapshot chains.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod app;
mod commands;
mod logging;

use commands::OutputFormat;

#[derive(Parser)]
#[command(
    name = "pulse",
    about = "Pulse — incremental metric snapshots for tracked entities",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Config file (default: ./pulse.toml if present, else built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Override the store path from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a pulse.toml scaffold
    Init {
        /// Directory to write pulse.toml into
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        /// Overwrite an existing pulse.toml
        #[arg(long)]
        force: bool,
    },
    /// Run a batch of observations through the tracker.
    ///
    /// The file holds either a JSON array of observations or one JSON
    /// object per line.
    Ingest {
        /// Observation file
        file: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show entity and snapshot counts
    Stats {
        /// Window for the "recent snapshots" count, e.g. 24h or 7d
        #[arg(short, long, default_value = "24h")]
        since: String,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show the snapshot chain of one entity, newest first
    History {
        /// Entity key
        key: String,
        /// Maximum number of snapshots to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// List tracked entities
    Entities {
        /// Include deactivated entities
        #[arg(short, long)]
        all: bool,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Stop listing an entity as active
    Deactivate {
        /// Entity key
        key: String,
    },
    /// Mark an entity as active again
    Activate {
        /// Entity key
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { path, force } = &cli.command {
        logging::init(&Default::default())?;
        return commands::init::run(path, cli.db.as_deref(), *force);
    }

    let config = app::load_config(cli.config.as_deref(), cli.db)?;
    logging::init(&config.logging)?;
    let app = app::App::open(config)?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Ingest { file, format } => commands::ingest::run(&app, &file, format).await,
        Commands::Stats { since, format } => commands::stats::run(&app, &since, format),
        Commands::History { key, limit, format } => {
            commands::history::run(&app, &key, limit, format)
        }
        Commands::Entities { all, format } => commands::entities::list(&app, all, format),
        Commands::Deactivate { key } => commands::entities::set_active(&app, &key, false),
        Commands::Activate { key } => commands::entities::set_active(&app, &key, true),
    }
}
