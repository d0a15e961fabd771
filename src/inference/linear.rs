//! Linear softmax classifier
//!
//! Averages each window over time, giving one value per feature channel,
//! then applies an affine map and a softmax. Weights are loaded from JSON:
//!
//! ```json
//! { "feature": "chroma", "weights": [[...12 values...], ...8 rows...], "bias": [...8 values...] }
//! ```
//!
//! A `"both"` model takes paired windows and reads 32 means per window:
//! the 20 MFCC channels followed by the 12 chroma channels.

use std::path::Path;

use log::{debug, info};
use ndarray::{concatenate, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{Classifier, PredictionVector, NUM_CLASSES};
use crate::error::{MaqamError, Result};
use crate::features::FeatureKind;
use crate::features::{N_CHROMA, N_MFCC};
use crate::windowing::{Window, WindowBatch};

/// On-disk layout of a linear model
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearModelFile {
    #[serde(default)]
    feature: FeatureKind,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// Softmax over an affine map of per-channel window means
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    feature: FeatureKind,
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl LinearClassifier {
    /// Build from `NUM_CLASSES` weight rows, each one value per channel
    pub fn new(feature: FeatureKind, weights: Vec<Vec<f32>>, bias: Vec<f32>) -> Result<Self> {
        if weights.len() != NUM_CLASSES {
            return Err(MaqamError::classifier(format!(
                "model has {} weight rows, expected {}",
                weights.len(),
                NUM_CLASSES
            )));
        }
        if bias.len() != NUM_CLASSES {
            return Err(MaqamError::classifier(format!(
                "model has {} bias terms, expected {}",
                bias.len(),
                NUM_CLASSES
            )));
        }

        let channels = feature.channels();
        if let Some(row) = weights.iter().find(|row| row.len() != channels) {
            return Err(MaqamError::classifier(format!(
                "weight row has {} columns, {} features have {} channels",
                row.len(),
                feature,
                channels
            )));
        }
        if weights.iter().flatten().chain(&bias).any(|w| !w.is_finite()) {
            return Err(MaqamError::classifier("model contains non-finite weights"));
        }

        let flat: Vec<f32> = weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((NUM_CLASSES, channels), flat)
            .map_err(|e| MaqamError::classifier(e.to_string()))?;

        Ok(Self {
            feature,
            weights,
            bias: Array1::from(bias),
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: LinearModelFile = serde_json::from_str(json)?;
        Self::new(file.feature, file.weights, file.bias)
    }

    /// Load a model written as JSON
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MaqamError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let json = std::fs::read_to_string(path)?;
        let model = Self::from_json_str(&json)?;
        info!(
            "Loaded linear model from {} ({} features)",
            path.display(),
            model.feature
        );
        Ok(model)
    }

    /// Feature kind the weights were trained on
    pub fn feature(&self) -> FeatureKind {
        self.feature
    }

    pub fn channels(&self) -> usize {
        self.weights.ncols()
    }

    fn check_channels(&self, windows: &WindowBatch, expected: usize, what: &str) -> Result<()> {
        match windows.window_shape() {
            Some((channels, _, _)) if channels != expected => Err(MaqamError::classifier(format!(
                "{} windows have {} channels, model expects {}",
                what, channels, expected
            ))),
            _ => Ok(()),
        }
    }

    fn score(&self, means: &Array1<f32>) -> PredictionVector {
        let logits = self.weights.dot(means) + &self.bias;
        softmax(&logits.to_vec())
    }
}

impl Classifier for LinearClassifier {
    fn name(&self) -> &str {
        "linear"
    }

    fn predict(&self, windows: &WindowBatch) -> Result<Vec<PredictionVector>> {
        if self.feature.is_paired() {
            return Err(MaqamError::classifier(
                "model was trained on paired MFCC and chroma windows",
            ));
        }
        self.check_channels(windows, self.channels(), "feature")?;

        debug!("Linear model scoring {} windows", windows.len());

        windows
            .iter()
            .map(|window| Ok(self.score(&window_means(window)?)))
            .collect()
    }

    fn predict_paired(
        &self,
        mfcc: &WindowBatch,
        chroma: &WindowBatch,
    ) -> Result<Vec<PredictionVector>> {
        if !self.feature.is_paired() {
            return Err(MaqamError::classifier(format!(
                "model was trained on {} windows alone",
                self.feature
            )));
        }
        if mfcc.len() != chroma.len() {
            return Err(MaqamError::classifier(format!(
                "paired inputs hold {} MFCC and {} chroma windows",
                mfcc.len(),
                chroma.len()
            )));
        }
        self.check_channels(mfcc, N_MFCC, "MFCC")?;
        self.check_channels(chroma, N_CHROMA, "chroma")?;

        debug!("Linear model scoring {} paired windows", mfcc.len());

        mfcc.iter()
            .zip(chroma.iter())
            .map(|(m, c)| {
                let (m, c) = (window_means(m)?, window_means(c)?);
                let means = concatenate(Axis(0), &[m.view(), c.view()])
                    .map_err(|e| MaqamError::classifier(e.to_string()))?;
                Ok(self.score(&means))
            })
            .collect()
    }
}

/// Mean of each channel over the window's time steps
fn window_means(window: &Window) -> Result<Array1<f32>> {
    window
        .mean_axis(Axis(1))
        .map(|m| m.index_axis_move(Axis(1), 0))
        .ok_or_else(|| MaqamError::classifier("window has no time steps"))
}

/// Numerically stable softmax
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f64> = logits.iter().map(|&l| ((l - max) as f64).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|&e| (e / total) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{aggregate, aggregate_paired, Maqam, Outcome, Verdict};
    use crate::windowing::Window;
    use approx::assert_abs_diff_eq;
    use std::io::Write;

    fn zero_model() -> LinearClassifier {
        LinearClassifier::new(FeatureKind::Chroma, vec![vec![0.0; 12]; 8], vec![0.0; 8]).unwrap()
    }

    #[test]
    fn test_softmax_is_distribution() {
        let p = softmax(&[1.0, 2.0, 3.0, 1000.0]);
        assert_abs_diff_eq!(p.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(p[3] > 0.99);
    }

    #[test]
    fn test_zero_model_is_uniform() {
        let batch = WindowBatch::new(vec![Window::from_elem((12, 5, 1), 0.3); 2]);
        let out = zero_model().predict(&batch).unwrap();
        assert_eq!(out.len(), 2);
        for p in out.iter().flatten() {
            assert_abs_diff_eq!(*p, 0.125, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_bias_drives_verdict() {
        let mut bias = vec![0.0; 8];
        bias[Maqam::Nahawand.index()] = 10.0;
        let model = LinearClassifier::new(FeatureKind::Chroma, vec![vec![0.0; 12]; 8], bias).unwrap();

        let batch = WindowBatch::new(vec![Window::zeros((12, 5, 1)); 3]);
        match aggregate(&batch, &model).unwrap() {
            Outcome::Scored(result) => {
                assert_eq!(result.verdict, Verdict::Classified(Maqam::Nahawand));
            }
            Outcome::Empty => panic!("expected scored outcome"),
        }
    }

    #[test]
    fn test_weights_read_channel_means() {
        let mut weights = vec![vec![0.0; 12]; 8];
        weights[Maqam::Hijaz.index()][4] = 20.0;
        let model = LinearClassifier::new(FeatureKind::Chroma, weights, vec![0.0; 8]).unwrap();

        let mut window = Window::zeros((12, 10, 1));
        window.index_axis_mut(Axis(0), 4).fill(1.0);
        let out = model.predict(&WindowBatch::new(vec![window])).unwrap();

        assert!(out[0][Maqam::Hijaz.index()] > 0.99);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(LinearClassifier::new(FeatureKind::Chroma, vec![vec![0.0; 12]; 7], vec![0.0; 8]).is_err());
        assert!(LinearClassifier::new(FeatureKind::Chroma, vec![vec![0.0; 12]; 8], vec![0.0; 3]).is_err());
        assert!(LinearClassifier::new(FeatureKind::Mfcc, vec![vec![0.0; 12]; 8], vec![0.0; 8]).is_err());
    }

    #[test]
    fn test_channel_mismatch_is_classifier_error() {
        let batch = WindowBatch::new(vec![Window::zeros((20, 5, 1))]);
        let err = zero_model().predict(&batch).unwrap_err();
        assert_eq!(err.error_code(), "CLASSIFIER_ERROR");
    }

    #[test]
    fn test_paired_model_reads_both_inputs() {
        // column 20 is the first chroma channel
        let mut weights = vec![vec![0.0; 32]; 8];
        weights[Maqam::Saba.index()][20] = 20.0;
        let model = LinearClassifier::new(FeatureKind::Both, weights, vec![0.0; 8]).unwrap();
        assert_eq!(model.channels(), 32);

        let mfcc = WindowBatch::new(vec![Window::zeros((20, 10, 1)); 3]);
        let mut chroma_window = Window::zeros((12, 10, 1));
        chroma_window.index_axis_mut(Axis(0), 0).fill(1.0);
        let chroma = WindowBatch::new(vec![chroma_window; 3]);

        match aggregate_paired(&mfcc, &chroma, &model).unwrap() {
            Outcome::Scored(result) => {
                assert_eq!(result.windows, 3);
                assert_eq!(result.verdict, Verdict::Classified(Maqam::Saba));
            }
            Outcome::Empty => panic!("expected scored outcome"),
        }
    }

    #[test]
    fn test_paired_model_rejects_single_input() {
        let model =
            LinearClassifier::new(FeatureKind::Both, vec![vec![0.0; 32]; 8], vec![0.0; 8]).unwrap();
        let batch = WindowBatch::new(vec![Window::zeros((12, 5, 1))]);
        assert!(model.predict(&batch).is_err());

        let chroma = WindowBatch::new(vec![Window::zeros((12, 5, 1))]);
        assert!(zero_model().predict_paired(&chroma, &chroma).is_err());

        let swapped = model.predict_paired(&chroma, &chroma).unwrap_err();
        assert!(swapped.to_string().contains("MFCC"));
    }

    #[test]
    fn test_load_from_json_file() {
        let json = serde_json::json!({
            "feature": "mfcc",
            "weights": vec![vec![0.1f32; 20]; 8],
            "bias": vec![0.0f32; 8],
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json).unwrap();

        let model = LinearClassifier::from_json_file(file.path()).unwrap();
        assert_eq!(model.feature(), FeatureKind::Mfcc);
        assert_eq!(model.channels(), 20);
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let missing = LinearClassifier::from_json_file(Path::new("/nonexistent/model.json"));
        assert!(matches!(missing, Err(MaqamError::FileNotFound { .. })));

        let malformed = LinearClassifier::from_json_str("{ \"weights\": 3 }");
        assert!(matches!(malformed, Err(MaqamError::Serialization(_))));
    }
}
