//! Window Builder
//!
//! Normalizes a feature matrix and cuts it into fixed-width, overlapping
//! windows for the classifier. Short matrices are tiled up to one full
//! window so every clip produces at least one window. Paired features are
//! windowed independently, each with its own normalization.

use log::debug;
use ndarray::{s, Array2, Array3, Array4, Axis};

use crate::error::{MaqamError, Result};
use crate::features::{FeatureMatrix, Features};

/// Added to the standard deviation so constant input does not divide by zero
pub const NORMALIZE_EPSILON: f64 = 1e-6;

/// Default window width in frames
pub const DEFAULT_TIME_STEPS: usize = 1000;

/// Default hop between window starts in frames
pub const DEFAULT_STRIDE: usize = 100;

/// One classifier input, shape `(channels, time_steps, 1)`
pub type Window = Array3<f32>;

/// Windows cut from one feature matrix, in time order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowBatch {
    windows: Vec<Window>,
}

impl WindowBatch {
    pub fn new(windows: Vec<Window>) -> Self {
        Self { windows }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Window> {
        self.windows.iter()
    }

    /// Shape shared by every window, `None` when empty
    pub fn window_shape(&self) -> Option<(usize, usize, usize)> {
        self.windows.first().map(|w| w.dim())
    }

    /// Stack into one `(batch, channels, time_steps, 1)` tensor
    pub fn to_tensor(&self) -> Option<Array4<f32>> {
        let (channels, time_steps, depth) = self.window_shape()?;
        let mut tensor = Array4::<f32>::zeros((self.windows.len(), channels, time_steps, depth));
        for (mut slot, window) in tensor.axis_iter_mut(Axis(0)).zip(&self.windows) {
            slot.assign(window);
        }
        Some(tensor)
    }
}

impl<'a> IntoIterator for &'a WindowBatch {
    type Item = &'a Window;
    type IntoIter = std::slice::Iter<'a, Window>;

    fn into_iter(self) -> Self::IntoIter {
        self.windows.iter()
    }
}

/// Windowed model inputs for one clip
#[derive(Debug, Clone, PartialEq)]
pub enum ModelInput {
    Single(WindowBatch),
    /// Window `i` of each batch covers the same frames
    Paired {
        mfcc: WindowBatch,
        chroma: WindowBatch,
    },
}

impl ModelInput {
    /// Windows per input
    pub fn len(&self) -> usize {
        match self {
            ModelInput::Single(batch) => batch.len(),
            ModelInput::Paired { mfcc, .. } => mfcc.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Zero mean, unit variance over the whole matrix
pub fn normalize(features: &FeatureMatrix) -> FeatureMatrix {
    let count = features.len();
    if count == 0 {
        return features.clone();
    }

    let mean = features.iter().map(|&v| v as f64).sum::<f64>() / count as f64;
    let variance = features
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / count as f64;
    let denom = variance.sqrt() + NORMALIZE_EPSILON;

    features.mapv(|v| ((v as f64 - mean) / denom) as f32)
}

/// Repeat columns until the matrix is `time_steps` wide
///
/// Matrices already at least `time_steps` wide, and matrices with no
/// columns, are returned unchanged.
pub fn pad_by_tiling(features: &FeatureMatrix, time_steps: usize) -> FeatureMatrix {
    let width = features.ncols();
    if width == 0 || width >= time_steps {
        return features.clone();
    }

    Array2::from_shape_fn((features.nrows(), time_steps), |(row, col)| {
        features[[row, col % width]]
    })
}

/// Full-width windows starting every `stride` columns; a trailing partial
/// window is dropped
pub fn slice_windows(features: &FeatureMatrix, time_steps: usize, stride: usize) -> Vec<Window> {
    let width = features.ncols();
    if time_steps == 0 || stride == 0 || width < time_steps {
        return Vec::new();
    }

    (0..=width - time_steps)
        .step_by(stride)
        .map(|start| {
            features
                .slice(s![.., start..start + time_steps])
                .to_owned()
                .insert_axis(Axis(2))
        })
        .collect()
}

/// Normalize, pad and slice a feature matrix into a `WindowBatch`
///
/// An empty batch means the matrix had nothing to window; it is not an
/// error.
///
/// # Errors
/// `InvalidParameter` if `time_steps` or `stride` is zero.
pub fn build_windows(
    features: &FeatureMatrix,
    time_steps: usize,
    stride: usize,
) -> Result<WindowBatch> {
    validate_params(time_steps, stride)?;

    let normalized = normalize(features);
    let padded = pad_by_tiling(&normalized, time_steps);
    let windows = slice_windows(&padded, time_steps, stride);

    debug!(
        "Windowed {}x{} features (padded to {}) into {} windows of {} steps",
        features.nrows(),
        features.ncols(),
        padded.ncols(),
        windows.len(),
        time_steps
    );

    Ok(WindowBatch::new(windows))
}

/// Window every matrix in `features` with the same width and stride
pub fn build_model_input(
    features: &Features,
    time_steps: usize,
    stride: usize,
) -> Result<ModelInput> {
    match features {
        Features::Single(matrix) => Ok(ModelInput::Single(build_windows(
            matrix, time_steps, stride,
        )?)),
        Features::Paired { mfcc, chroma } => Ok(ModelInput::Paired {
            mfcc: build_windows(mfcc, time_steps, stride)?,
            chroma: build_windows(chroma, time_steps, stride)?,
        }),
    }
}

/// Check window width and stride
pub fn validate_params(time_steps: usize, stride: usize) -> Result<()> {
    if time_steps == 0 {
        return Err(MaqamError::invalid_parameter(
            "time_steps",
            time_steps,
            "a positive number of frames",
        ));
    }
    if stride == 0 {
        return Err(MaqamError::invalid_parameter(
            "stride",
            stride,
            "a positive number of frames",
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
