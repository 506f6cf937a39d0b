use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tapedeck")]
#[command(author, version, about = "Metadata reconciliation and episode verification")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile every content unit in the store
    Reconcile {
        /// Merge and verify without writing records
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of lookup groups processed at once
        #[arg(long)]
        fan_out: Option<usize>,
    },

    /// Load content units from a JSON manifest into the store
    Import {
        /// Manifest file (JSON array of units)
        #[arg(required = true)]
        manifest: PathBuf,
    },

    /// Print the stored record for a content unit
    Show {
        /// Content checksum
        #[arg(required = true)]
        checksum: String,
    },

    /// Print the effective per-field provider priority
    Fields,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
