//! Maqam - Recitation Mode Classification
//!
//! Identifies the maqam (melodic mode) of a Quranic recitation from a
//! recording. A clip flows through five stages:
//!
//! 1. Signal Loader - decode, downmix, resample to 22050Hz
//! 2. Band-pass Filter - zero-phase Butterworth keeping the 300-3400Hz vocal band
//! 3. Feature Extractor - chroma, MFCC, or both paired; channels by frames
//! 4. Window Builder - normalize, tile short clips, slice overlapping windows
//! 5. Inference Aggregator - score all windows at once, average, rank and gate
//!
//! # Example
//!
//! ```no_run
//! use maqam::{classify, ClassifyConfig, Outcome, UniformClassifier};
//! use std::path::Path;
//!
//! let outcome = classify(Path::new("recitation.wav"), &UniformClassifier, &ClassifyConfig::default())?;
//! if let Outcome::Scored(result) = outcome {
//!     println!("{} {:?}", result.best().maqam, result.verdict);
//! }
//! # Ok::<(), maqam::MaqamError>(())
//! ```

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod features;
pub mod inference;
pub mod pipeline;
pub mod windowing;

pub use engine::{load_signal, Signal, SAMPLE_RATE};
pub use error::{MaqamError, Result};
pub use features::{FeatureKind, FeatureMatrix, Features};
pub use inference::{
    aggregate, aggregate_input, aggregate_paired, AggregateResult, Classifier, LinearClassifier, Maqam, Outcome, RankedClass,
    UniformClassifier, Verdict, CONFIDENCE_THRESHOLD, NUM_CLASSES,
};
pub use pipeline::{classify, classify_signal, ClassifyConfig};
pub use windowing::{build_model_input, build_windows, ModelInput, Window, WindowBatch};
