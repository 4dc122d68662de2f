use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediasync")]
#[command(author, version, about = "Keeps a media catalog in sync with the filesystem")]
pub struct Cli {
    /// JSON config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging for all mediasync crates
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the job runner and file watcher until interrupted
    Start {
        /// Do not watch library roots; only process queued and startup jobs
        #[arg(long)]
        no_watch: bool,
    },

    /// Scan every configured library once and process the resulting jobs
    Scan {
        /// Restrict the scan to the library with this name
        #[arg(short, long)]
        library: Option<String>,
    },

    /// Print the dimensions, duration and size ffprobe reports for a file
    Probe {
        #[arg(required = true)]
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Report whether ffmpeg and ffprobe can be found
    CheckTools,

    /// Parse a config file and list its warnings
    Validate {
        /// Defaults to --config
        config: Option<PathBuf>,
    },

    /// Print the mediasync version
    Version,
}
