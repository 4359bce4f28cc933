use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sratim")]
#[command(author, version, about = "Adaptive playback for remote media libraries")]
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
    /// Play a media file headless, reading commands from stdin
    Play {
        /// Path of the file inside its library
        #[arg(required = true)]
        path: String,

        /// Library the path belongs to (defaults to endpoint.library_id)
        #[arg(short, long)]
        library: Option<String>,

        /// Start position, in seconds or h:mm:ss
        #[arg(short, long, default_value = "0")]
        start: String,

        /// Audio track index
        #[arg(long)]
        audio_track: Option<usize>,

        /// Subtitle track index
        #[arg(long)]
        subtitle_track: Option<usize>,
    },

    /// Fetch and display a media descriptor
    Probe {
        /// Path of the file inside its library
        #[arg(required = true)]
        path: String,

        /// Library the path belongs to (defaults to endpoint.library_id)
        #[arg(short, long)]
        library: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
