//! CLI Module
//!
//! Command-line interface for the maqam classifier.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::features::FeatureKind;

/// Maqam Classifier - identify the melodic mode of a Quranic recitation
#[derive(Parser, Debug)]
#[command(name = "maqam-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that runs the pipeline
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Linear model weights (JSON); scores uniformly when omitted
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Settings file (JSON) with time_steps, stride and feature
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Window width in feature frames
    #[arg(long)]
    pub time_steps: Option<usize>,

    /// Frames between window starts
    #[arg(long)]
    pub stride: Option<usize>,

    /// Feature representation (chroma, mfcc, both)
    #[arg(long)]
    pub feature: Option<FeatureKind>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a single recording
    #[command(name = "classify")]
    Classify {
        /// Audio file (WAV)
        file: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Classify every WAV file under a directory
    #[command(name = "batch")]
    Batch {
        /// Directory to search recursively
        dir: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// List the maqam classes in classifier output order
    #[command(name = "labels")]
    Labels,
}
