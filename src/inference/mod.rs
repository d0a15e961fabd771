//! Inference Aggregator
//!
//! Runs the classifier once over a whole `WindowBatch`, averages the
//! per-window probabilities and ranks the maqam classes. A confidence gate
//! decides whether the top class is reported or the clip is called neutral.
//!
//! This module provides:
//! - `Classifier` trait for anything that scores windows
//! - `aggregate` turning a batch into an `Outcome`, and `aggregate_paired`
//!   for two-input (MFCC + chroma) models
//! - A linear softmax classifier loadable from JSON
//! - Mock classifiers for testing

mod linear;
mod mock;

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{MaqamError, Result};
use crate::windowing::{ModelInput, WindowBatch};

pub use linear::LinearClassifier;
pub use mock::*;

/// Number of maqam classes the classifier scores
pub const NUM_CLASSES: usize = 8;

/// Top-class probability below which a clip is reported as neutral
pub const CONFIDENCE_THRESHOLD: f32 = 0.80;

/// How many ranked classes a result carries
pub const TOP_K: usize = 3;

/// Allowed drift of a prediction vector's sum away from 1
const SUM_TOLERANCE: f64 = 1e-3;

/// Allowed excursion of a single probability outside [0, 1]
const RANGE_TOLERANCE: f32 = 1e-4;

/// Drift of the averaged vector's sum that is left alone
const MEAN_SUM_TOLERANCE: f64 = 1e-7;

/// Recitation modes, in classifier output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Maqam {
    Ajam,
    Bayat,
    Hijaz,
    Kurd,
    Nahawand,
    Rast,
    Saba,
    Seka,
}

impl Maqam {
    /// Every class, indexed by classifier output position
    pub const ALL: [Maqam; NUM_CLASSES] = [
        Maqam::Ajam,
        Maqam::Bayat,
        Maqam::Hijaz,
        Maqam::Kurd,
        Maqam::Nahawand,
        Maqam::Rast,
        Maqam::Saba,
        Maqam::Seka,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Maqam::Ajam => "Ajam",
            Maqam::Bayat => "Bayat",
            Maqam::Hijaz => "Hijaz",
            Maqam::Kurd => "Kurd",
            Maqam::Nahawand => "Nahawand",
            Maqam::Rast => "Rast",
            Maqam::Saba => "Saba",
            Maqam::Seka => "Seka",
        }
    }
}

impl fmt::Display for Maqam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifier output for one window: one probability per class
pub type PredictionVector = Vec<f32>;

/// Anything that maps a batch of windows to per-class probabilities
///
/// Implementations must return exactly one vector per window, in window
/// order. They are shared read-only across requests.
pub trait Classifier: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Score every window in one call
    fn predict(&self, windows: &WindowBatch) -> Result<Vec<PredictionVector>>;

    /// Score paired MFCC and chroma windows in one call
    ///
    /// Window `i` of both batches covers the same stretch of audio. Models
    /// with a single input reject this.
    fn predict_paired(
        &self,
        _mfcc: &WindowBatch,
        _chroma: &WindowBatch,
    ) -> Result<Vec<PredictionVector>> {
        Err(MaqamError::classifier(format!(
            "{} takes a single input, not paired MFCC and chroma windows",
            self.name()
        )))
    }
}

/// A class and its averaged probability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedClass {
    pub maqam: Maqam,
    pub probability: f32,
}

/// Outcome of the confidence gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "maqam", rename_all = "snake_case")]
pub enum Verdict {
    /// Top class cleared the threshold
    Classified(Maqam),
    /// Top class fell below the threshold
    Neutral,
}

/// Averaged, ranked and gated classifier output for one clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Mean probability per class over all windows, in `Maqam::ALL` order
    pub probabilities: [f32; NUM_CLASSES],
    /// Best `TOP_K` classes, highest probability first
    pub top: Vec<RankedClass>,
    pub verdict: Verdict,
    /// Number of windows that were scored
    pub windows: usize,
}

impl AggregateResult {
    /// Highest ranked class
    pub fn best(&self) -> RankedClass {
        self.top[0]
    }

    pub fn is_neutral(&self) -> bool {
        self.verdict == Verdict::Neutral
    }

    /// Accepted class, `None` when neutral
    pub fn accepted(&self) -> Option<Maqam> {
        match self.verdict {
            Verdict::Classified(maqam) => Some(maqam),
            Verdict::Neutral => None,
        }
    }
}

/// Terminal state of a classification request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// No window could be extracted from the clip
    Empty,
    /// Windows were scored
    Scored(AggregateResult),
}

impl Outcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, Outcome::Empty)
    }

    pub fn result(&self) -> Option<&AggregateResult> {
        match self {
            Outcome::Empty => None,
            Outcome::Scored(result) => Some(result),
        }
    }
}

/// Score a batch and reduce it to a single ranked, gated result
///
/// An empty batch returns `Outcome::Empty` without calling the classifier.
///
/// # Errors
/// Whatever the classifier returns, or `Classifier` if its output does not
/// hold one valid probability vector per window.
pub fn aggregate(batch: &WindowBatch, classifier: &dyn Classifier) -> Result<Outcome> {
    if batch.is_empty() {
        debug!("No windows to score; skipping {}", classifier.name());
        return Ok(Outcome::Empty);
    }

    let predictions = classifier.predict(batch)?;
    summarize(classifier.name(), &predictions, batch.len())
}

/// Same as [`aggregate`] for a two-input model
///
/// # Errors
/// `Classifier` if the batches hold different window counts, plus
/// everything [`aggregate`] reports.
pub fn aggregate_paired(
    mfcc: &WindowBatch,
    chroma: &WindowBatch,
    classifier: &dyn Classifier,
) -> Result<Outcome> {
    if mfcc.len() != chroma.len() {
        return Err(MaqamError::classifier(format!(
            "paired inputs hold {} MFCC and {} chroma windows",
            mfcc.len(),
            chroma.len()
        )));
    }
    if mfcc.is_empty() {
        debug!("No windows to score; skipping {}", classifier.name());
        return Ok(Outcome::Empty);
    }

    let predictions = classifier.predict_paired(mfcc, chroma)?;
    summarize(classifier.name(), &predictions, mfcc.len())
}

/// Dispatch on the shape of the model input
pub fn aggregate_input(input: &ModelInput, classifier: &dyn Classifier) -> Result<Outcome> {
    match input {
        ModelInput::Single(batch) => aggregate(batch, classifier),
        ModelInput::Paired { mfcc, chroma } => aggregate_paired(mfcc, chroma, classifier),
    }
}

fn summarize(name: &str, predictions: &[PredictionVector], windows: usize) -> Result<Outcome> {
    validate_predictions(predictions, windows)?;

    let probabilities = mean_probabilities(predictions);
    let top = rank(&probabilities, TOP_K);
    let verdict = gate(top[0]);

    debug!(
        "{} scored {} windows: best {} ({:.4}), verdict {:?}",
        name, windows, top[0].maqam, top[0].probability, verdict
    );

    Ok(Outcome::Scored(AggregateResult {
        probabilities,
        top,
        verdict,
        windows,
    }))
}

/// Apply the confidence threshold to the best class
pub fn gate(best: RankedClass) -> Verdict {
    if best.probability < CONFIDENCE_THRESHOLD {
        Verdict::Neutral
    } else {
        Verdict::Classified(best.maqam)
    }
}

/// Classes ordered by descending probability; ties keep class order
pub fn rank(probabilities: &[f32; NUM_CLASSES], k: usize) -> Vec<RankedClass> {
    let mut ranked: Vec<RankedClass> = Maqam::ALL
        .iter()
        .map(|&maqam| RankedClass {
            maqam,
            probability: probabilities[maqam.index()],
        })
        .collect();

    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranked.truncate(k.min(NUM_CLASSES));
    ranked
}

/// Element-wise mean, clamped to [0, 1] and rescaled to sum to 1 when the
/// classifier's own rounding left it off by more than `MEAN_SUM_TOLERANCE`
fn mean_probabilities(predictions: &[PredictionVector]) -> [f32; NUM_CLASSES] {
    let mut sums = [0.0f64; NUM_CLASSES];
    for prediction in predictions {
        for (sum, &p) in sums.iter_mut().zip(prediction) {
            *sum += p as f64;
        }
    }

    let count = predictions.len() as f64;
    let mut mean = sums.map(|sum| (sum / count).clamp(0.0, 1.0));

    let total: f64 = mean.iter().sum();
    if total > 0.0 && (total - 1.0).abs() > MEAN_SUM_TOLERANCE {
        for m in mean.iter_mut() {
            *m /= total;
        }
    }

    mean.map(|m| m as f32)
}

fn validate_predictions(predictions: &[PredictionVector], expected: usize) -> Result<()> {
    if predictions.len() != expected {
        return Err(MaqamError::classifier(format!(
            "returned {} predictions for {} windows",
            predictions.len(),
            expected
        )));
    }

    for (i, prediction) in predictions.iter().enumerate() {
        if prediction.len() != NUM_CLASSES {
            return Err(MaqamError::classifier(format!(
                "prediction {} has {} classes, expected {}",
                i,
                prediction.len(),
                NUM_CLASSES
            )));
        }

        if let Some(bad) = prediction
            .iter()
            .find(|p| !p.is_finite() || **p < -RANGE_TOLERANCE || **p > 1.0 + RANGE_TOLERANCE)
        {
            return Err(MaqamError::classifier(format!(
                "prediction {} holds {} outside [0, 1]",
                i, bad
            )));
        }

        let sum: f64 = prediction.iter().map(|&p| p as f64).sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(MaqamError::classifier(format!(
                "prediction {} sums to {:.6}, expected 1",
                i, sum
            )));
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
