//! CLI Module
//!
//! Command-line interface for headless sample editing.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Samplecraft - sample editor engine
#[derive(Parser, Debug)]
#[command(name = "samplecraft")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Editor configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render an edited copy of an audio file through the capture pipeline
    #[command(name = "render")]
    Render {
        /// Input audio file
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Title used for the output name (defaults to the file stem)
        #[arg(long)]
        title: Option<String>,

        /// Tempo factor
        #[arg(long, default_value_t = 1.0)]
        tempo: f64,

        /// Pitch shift in semitones (-12..=12)
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        pitch: i32,

        /// Play the sample backwards
        #[arg(long)]
        reverse: bool,
    },

    /// Render every audio file under a directory
    #[command(name = "batch")]
    Batch {
        /// Directory to scan recursively
        dir: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Tempo factor
        #[arg(long, default_value_t = 1.0)]
        tempo: f64,

        /// Pitch shift in semitones (-12..=12)
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        pitch: i32,

        /// Play samples backwards
        #[arg(long)]
        reverse: bool,
    },

    /// Print format, duration and levels of an audio file
    #[command(name = "inspect")]
    Inspect {
        /// Audio file
        input: PathBuf,
    },

    /// Print the effective configuration
    #[command(name = "config")]
    Config,

    /// Generate samples from a prompt
    #[cfg(feature = "remote")]
    #[command(name = "generate")]
    Generate {
        /// Text description of the sample
        prompt: String,
    },
}
