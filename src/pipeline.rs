//! Classification pipeline
//!
//! Load → band-pass → features → windows → aggregate. Each request runs the
//! stages in order and stops at the first failure; nothing is shared between
//! requests except the classifier.

use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::dsp::BandPass;
use crate::engine::{load_signal, Signal, SAMPLE_RATE};
use crate::error::{MaqamError, Result};
use crate::features::{extract, FeatureKind};
use crate::inference::{aggregate_input, Classifier, Outcome};
use crate::windowing::{build_model_input, validate_params, DEFAULT_STRIDE, DEFAULT_TIME_STEPS};

/// Per-request classification settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Window width in feature frames
    pub time_steps: usize,
    /// Frames between consecutive window starts
    pub stride: usize,
    pub feature: FeatureKind,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            time_steps: DEFAULT_TIME_STEPS,
            stride: DEFAULT_STRIDE,
            feature: FeatureKind::Chroma,
        }
    }
}

impl ClassifyConfig {
    pub fn new(time_steps: usize, stride: usize) -> Self {
        Self {
            time_steps,
            stride,
            ..Self::default()
        }
    }

    pub fn with_feature(mut self, feature: FeatureKind) -> Self {
        self.feature = feature;
        self
    }

    /// Read settings from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MaqamError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_params(self.time_steps, self.stride)
    }
}

/// Classify the audio file at `path`
///
/// # Errors
/// Stops at the first failing stage: `FileNotFound`/`Decode` when loading,
/// `Filter` when the clip is too short, `InvalidParameter` for a bad config,
/// `Classifier` when scoring fails.
pub fn classify(
    path: &Path,
    classifier: &dyn Classifier,
    config: &ClassifyConfig,
) -> Result<Outcome> {
    config.validate()?;

    info!("Classifying {}", path.display());
    let signal = load_signal(path)?;
    debug!(
        "Loaded {:.2}s at {}Hz ({} samples)",
        signal.duration_secs(),
        signal.sample_rate(),
        signal.len()
    );

    let outcome = classify_signal(&signal, classifier, config)?;
    log_outcome(path, &outcome);
    Ok(outcome)
}

/// Run every stage after loading on an in-memory signal
///
/// The signal must already be at 22050 Hz; `load_signal` resamples on the
/// way in.
///
/// # Errors
/// `InvalidParameter` for any other sample rate, then the same as
/// [`classify`] from the filter stage on.
pub fn classify_signal(
    signal: &Signal,
    classifier: &dyn Classifier,
    config: &ClassifyConfig,
) -> Result<Outcome> {
    config.validate()?;
    if signal.sample_rate() != SAMPLE_RATE {
        return Err(MaqamError::invalid_parameter(
            "sample_rate",
            signal.sample_rate(),
            &format!("{}Hz", SAMPLE_RATE),
        ));
    }

    let filtered = BandPass::vocal(SAMPLE_RATE)?.apply(signal)?;
    debug!("Band-pass filtered {} samples", filtered.len());

    let features = extract(&filtered, config.feature);
    let input = build_model_input(&features, config.time_steps, config.stride)?;

    aggregate_input(&input, classifier)
}

fn log_outcome(path: &Path, outcome: &Outcome) {
    match outcome {
        Outcome::Empty => info!("{}: no windows to classify", path.display()),
        Outcome::Scored(result) => info!(
            "{}: {} ({:.1}% over {} windows){}",
            path.display(),
            result.best().maqam,
            result.best().probability * 100.0,
            result.windows,
            if result.is_neutral() { ", neutral" } else { "" }
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{CountingClassifier, PredictionVector, UniformClassifier};
    use crate::windowing::WindowBatch;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ClassifyConfig::default();
        assert_eq!(config.time_steps, 1000);
        assert_eq!(config.stride, 100);
        assert_eq!(config.feature, FeatureKind::Chroma);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "time_steps": 500, "feature": "mfcc" }}"#).unwrap();

        let config = ClassifyConfig::from_json_file(file.path()).unwrap();
        assert_eq!(
            config,
            ClassifyConfig::new(500, 100).with_feature(FeatureKind::Mfcc)
        );
    }

    #[test]
    fn test_config_rejects_zero_stride() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "stride": 0 }}"#).unwrap();

        let err = ClassifyConfig::from_json_file(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_invalid_config_skips_every_stage() {
        let classifier = CountingClassifier::new(UniformClassifier);
        let signal = Signal::sine(440.0, 1.0, SAMPLE_RATE);

        let result = classify_signal(&signal, &classifier, &ClassifyConfig::new(0, 100));
        assert!(result.is_err());
        assert_eq!(classifier.calls(), 0);
    }

    #[test]
    fn test_short_signal_fails_before_classifier() {
        let classifier = CountingClassifier::new(UniformClassifier);
        let signal = Signal::new(vec![0.1; 20], SAMPLE_RATE);

        let err = classify_signal(&signal, &classifier, &ClassifyConfig::default()).unwrap_err();
        assert_eq!(err.error_code(), "FILTER_ERROR");
        assert_eq!(classifier.calls(), 0);
    }

    #[test]
    fn test_mfcc_pipeline_scores() {
        let signal = Signal::sine(300.0, 1.0, SAMPLE_RATE);
        let config = ClassifyConfig::new(100, 10).with_feature(FeatureKind::Mfcc);

        let outcome = classify_signal(&signal, &UniformClassifier, &config).unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.windows, 1);
        assert!(result.is_neutral());
    }

    #[test]
    fn test_other_sample_rates_rejected() {
        let classifier = CountingClassifier::new(UniformClassifier);
        let signal = Signal::sine(440.0, 1.0, 44100);

        let err = classify_signal(&signal, &classifier, &ClassifyConfig::default()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
        assert!(err.to_string().contains("sample_rate"));
        assert_eq!(classifier.calls(), 0);
    }

    /// Checks the paired batches it receives line up before scoring them
    struct PairChecker;

    impl Classifier for PairChecker {
        fn name(&self) -> &str {
            "pair-checker"
        }

        fn predict(&self, windows: &WindowBatch) -> Result<Vec<PredictionVector>> {
            UniformClassifier.predict(windows)
        }

        fn predict_paired(
            &self,
            mfcc: &WindowBatch,
            chroma: &WindowBatch,
        ) -> Result<Vec<PredictionVector>> {
            assert_eq!(mfcc.len(), chroma.len());
            assert_eq!(mfcc.window_shape(), Some((20, 200, 1)));
            assert_eq!(chroma.window_shape(), Some((12, 200, 1)));
            UniformClassifier.predict(chroma)
        }
    }

    #[test]
    fn test_both_features_scored_in_one_call() {
        let signal = Signal::sine(440.0, 10.0, SAMPLE_RATE);
        let config = ClassifyConfig::new(200, 100).with_feature(FeatureKind::Both);

        let classifier = CountingClassifier::new(PairChecker);
        let outcome = classify_signal(&signal, &classifier, &config).unwrap();

        // 431 frames give windows starting at 0, 100 and 200
        assert_eq!(outcome.result().unwrap().windows, 3);
        assert_eq!(classifier.calls(), 1);
        assert_eq!(classifier.windows_seen(), 3);
    }
}
