//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use super::PipelineArgs;
use crate::inference::{Classifier, LinearClassifier, Maqam, Outcome, UniformClassifier};
use crate::pipeline::{classify as run_pipeline, ClassifyConfig};

/// One line of JSON output
#[derive(Debug, Serialize)]
struct Report<'a> {
    file: &'a Path,
    #[serde(flatten)]
    outcome: &'a Outcome,
}

/// Classify a single recording.
pub fn classify(file: &Path, args: &PipelineArgs) -> Result<()> {
    let (classifier, config) = prepare(args)?;

    let outcome = run_pipeline(file, classifier.as_ref(), &config)
        .with_context(|| format!("Failed to classify {}", file.display()))?;

    print_outcome(file, &outcome, args.json)
}

/// Classify every WAV file under `dir`; failures are reported and skipped.
pub fn batch(dir: &Path, args: &PipelineArgs) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {}", dir.display());
    }

    let (classifier, config) = prepare(args)?;
    let files = find_wav_files(dir);
    info!("Found {} WAV files under {}", files.len(), dir.display());

    let mut failures = 0;
    for file in &files {
        match run_pipeline(file, classifier.as_ref(), &config) {
            Ok(outcome) => print_outcome(file, &outcome, args.json)?,
            Err(e) => {
                failures += 1;
                warn!("{}: {}", file.display(), e);
                if !args.json {
                    println!("{}: error: {}", file.display(), e.friendly_message());
                }
            }
        }
    }

    if !args.json {
        println!(
            "\n{} files, {} classified, {} failed",
            files.len(),
            files.len() - failures,
            failures
        );
    }

    Ok(())
}

/// Print the maqam classes in classifier output order.
pub fn labels() -> Result<()> {
    for maqam in Maqam::ALL {
        println!("{} {}", maqam.index(), maqam);
    }
    Ok(())
}

// ============================================================================
// Internal helper functions
// ============================================================================

/// Build the classifier and settings from the command line.
///
/// Flags override the config file. A loaded model fixes the feature kind.
fn prepare(args: &PipelineArgs) -> Result<(Box<dyn Classifier>, ClassifyConfig)> {
    let mut config = match &args.config {
        Some(path) => ClassifyConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ClassifyConfig::default(),
    };

    if let Some(time_steps) = args.time_steps {
        config.time_steps = time_steps;
    }
    if let Some(stride) = args.stride {
        config.stride = stride;
    }
    if let Some(feature) = args.feature {
        config.feature = feature;
    }

    let classifier: Box<dyn Classifier> = match &args.model {
        Some(path) => {
            let model = LinearClassifier::from_json_file(path)
                .with_context(|| format!("Failed to load model {}", path.display()))?;
            if model.feature() != config.feature {
                warn!(
                    "Model expects {} features; ignoring requested {}",
                    model.feature(),
                    config.feature
                );
                config.feature = model.feature();
            }
            Box::new(model)
        }
        None => {
            warn!("No model given; every class will score equally");
            Box::new(UniformClassifier)
        }
    };

    config.validate()?;
    Ok((classifier, config))
}

fn find_wav_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("wav"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

fn print_outcome(file: &Path, outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        let report = Report { file, outcome };
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    match outcome {
        Outcome::Empty => println!("{}: no audio to classify", file.display()),
        Outcome::Scored(result) => {
            match result.accepted() {
                Some(maqam) => println!(
                    "{}: {} ({:.1}%)",
                    file.display(),
                    maqam,
                    result.best().probability * 100.0
                ),
                None => println!("{}: neutral", file.display()),
            }
            for (rank, class) in result.top.iter().enumerate() {
                println!(
                    "  {}. {:<9} {:5.1}%",
                    rank + 1,
                    class.maqam,
                    class.probability * 100.0
                );
            }
            println!("  ({} windows)", result.windows);
        }
    }

    Ok(())
}
