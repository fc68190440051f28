//! Samplecraft CLI - headless sample editing
//!
//! Command-line interface for the Samplecraft editor engine.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use samplecraft::cli::commands;
use samplecraft::cli::{Cli, Commands};
use samplecraft::engine::graph::PlaybackParams;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Also captures `log` records through the tracing-log bridge
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    info!("Samplecraft v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Some(cmd) => handle_command(cmd, &config),
        None => {
            println!("Samplecraft v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &samplecraft::EditorConfig) -> anyhow::Result<()> {
    match cmd {
        Commands::Render {
            input,
            output,
            title,
            tempo,
            pitch,
            reverse,
        } => {
            let params = PlaybackParams {
                tempo,
                pitch,
                reverse,
                looping: false,
            };
            commands::render(&input, &output, title.as_deref(), params, config)
                .with_context(|| format!("rendering {}", input.display()))?;
        }
        Commands::Batch {
            dir,
            output,
            tempo,
            pitch,
            reverse,
        } => {
            let params = PlaybackParams {
                tempo,
                pitch,
                reverse,
                looping: false,
            };
            commands::batch(&dir, &output, params, config)?;
        }
        Commands::Inspect { input } => {
            commands::inspect(&input).with_context(|| format!("inspecting {}", input.display()))?
        }
        Commands::Config => commands::print_config(config)?,
        #[cfg(feature = "remote")]
        Commands::Generate { prompt } => commands::generate(&prompt, config)?,
    }
    Ok(())
}
