pub mod entities;
pub mod history;
pub mod ingest;
pub mod init;
pub mod stats;

use clap::ValueEnum;

/// Output format shared by the reporting commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
