//! Mock classifiers for testing
//!
//! These classifiers don't look at the windows' contents. They return
//! scripted probabilities so aggregation and gating can be checked without
//! a trained model. Paired inputs are scored as if only the MFCC half was
//! given.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Classifier, PredictionVector, NUM_CLASSES};
use crate::error::{MaqamError, Result};
use crate::windowing::WindowBatch;

/// Scores every class equally
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformClassifier;

impl Classifier for UniformClassifier {
    fn name(&self) -> &str {
        "uniform"
    }

    fn predict(&self, windows: &WindowBatch) -> Result<Vec<PredictionVector>> {
        let p = 1.0 / NUM_CLASSES as f32;
        Ok(vec![vec![p; NUM_CLASSES]; windows.len()])
    }

    fn predict_paired(
        &self,
        mfcc: &WindowBatch,
        _chroma: &WindowBatch,
    ) -> Result<Vec<PredictionVector>> {
        self.predict(mfcc)
    }
}

/// Returns the same vector for every window
///
/// The vector is not checked, so malformed output can be fed to the
/// aggregator.
#[derive(Debug, Clone)]
pub struct FixedClassifier {
    probabilities: PredictionVector,
}

impl FixedClassifier {
    pub fn new(probabilities: PredictionVector) -> Self {
        Self { probabilities }
    }
}

impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    fn predict(&self, windows: &WindowBatch) -> Result<Vec<PredictionVector>> {
        Ok(vec![self.probabilities.clone(); windows.len()])
    }

    fn predict_paired(
        &self,
        mfcc: &WindowBatch,
        _chroma: &WindowBatch,
    ) -> Result<Vec<PredictionVector>> {
        self.predict(mfcc)
    }
}

/// Hands out its vectors in turn, one per window, wrapping around
#[derive(Debug, Clone)]
pub struct CyclingClassifier {
    sequence: Vec<PredictionVector>,
}

impl CyclingClassifier {
    pub fn new(sequence: Vec<PredictionVector>) -> Self {
        Self { sequence }
    }
}

impl Classifier for CyclingClassifier {
    fn name(&self) -> &str {
        "cycling"
    }

    fn predict(&self, windows: &WindowBatch) -> Result<Vec<PredictionVector>> {
        if self.sequence.is_empty() {
            return Err(MaqamError::classifier("cycling classifier has no vectors"));
        }
        Ok(self.sequence.iter().cycle().take(windows.len()).cloned().collect())
    }

    fn predict_paired(
        &self,
        mfcc: &WindowBatch,
        _chroma: &WindowBatch,
    ) -> Result<Vec<PredictionVector>> {
        self.predict(mfcc)
    }
}

/// Always fails with a classifier error
#[derive(Debug, Clone)]
pub struct FailingClassifier {
    reason: String,
}

impl FailingClassifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Classifier for FailingClassifier {
    fn name(&self) -> &str {
        "failing"
    }

    fn predict(&self, _windows: &WindowBatch) -> Result<Vec<PredictionVector>> {
        Err(MaqamError::classifier(self.reason.clone()))
    }

    fn predict_paired(
        &self,
        _mfcc: &WindowBatch,
        _chroma: &WindowBatch,
    ) -> Result<Vec<PredictionVector>> {
        Err(MaqamError::classifier(self.reason.clone()))
    }
}

/// Wraps another classifier and records how it was called
#[derive(Debug, Default)]
pub struct CountingClassifier<C> {
    inner: C,
    calls: AtomicUsize,
    windows_seen: AtomicUsize,
}

impl<C: Classifier> CountingClassifier<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            windows_seen: AtomicUsize::new(0),
        }
    }

    /// Number of `predict` and `predict_paired` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Total windows scored so far (pairs count once)
    pub fn windows_seen(&self) -> usize {
        self.windows_seen.load(Ordering::SeqCst)
    }
}

impl<C: Classifier> Classifier for CountingClassifier<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn predict(&self, windows: &WindowBatch) -> Result<Vec<PredictionVector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.windows_seen.fetch_add(windows.len(), Ordering::SeqCst);
        self.inner.predict(windows)
    }

    fn predict_paired(
        &self,
        mfcc: &WindowBatch,
        chroma: &WindowBatch,
    ) -> Result<Vec<PredictionVector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.windows_seen.fetch_add(mfcc.len(), Ordering::SeqCst);
        self.inner.predict_paired(mfcc, chroma)
    }
}
