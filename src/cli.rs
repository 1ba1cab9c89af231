use clap::{Parser, Subcommand};
use splice_core::Strategy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "splicer")]
#[command(author, version, about = "Marker-driven audio splicing")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stitch a track according to a job file
    Stitch {
        /// Job description (JSON)
        #[arg(required = true)]
        job: PathBuf,

        /// Stitching strategy (overrides the config)
        #[arg(long)]
        strategy: Option<Strategy>,

        /// Show the plan without stitching
        #[arg(long)]
        dry_run: bool,

        /// Leave the stitched file in the temp directory
        #[arg(long)]
        keep_output: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe an audio file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
