//! Maqam CLI - Recitation Mode Classifier
//!
//! Command-line interface for the maqam classification pipeline.

use clap::Parser;
use env_logger::Env;
use log::debug;

use maqam::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    debug!("Maqam Classifier v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Classify { file, pipeline } => commands::classify(&file, &pipeline),
        Commands::Batch { dir, pipeline } => commands::batch(&dir, &pipeline),
        Commands::Labels => commands::labels(),
    }
}
