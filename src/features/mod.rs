//! Feature extraction
//!
//! Turns a filtered signal into time-frequency `FeatureMatrix`es:
//! rows are feature channels, columns are STFT frames. A two-input model
//! gets MFCC and chroma matrices of the same clip side by side.

mod chroma;
mod mfcc;
mod stft;
mod tuning;

use std::fmt;
use std::str::FromStr;

use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::engine::Signal;

pub use chroma::{chroma_filter_bank, chroma_stft, N_CHROMA};
pub use mfcc::{hz_to_mel, mel_filter_bank, mel_to_hz, mfcc, N_MELS, N_MFCC};
pub use stft::{frame_count, power_spectrogram, HOP_LENGTH, N_FFT};
pub use tuning::estimate_tuning;

/// Time-frequency features, shape `(channels, frames)`
pub type FeatureMatrix = Array2<f32>;

/// Which feature representation feeds the windowing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// 12-bin chroma energy
    #[default]
    Chroma,
    /// 20 mel-frequency cepstral coefficients
    Mfcc,
    /// MFCC and chroma as two separate model inputs
    Both,
}

impl FeatureKind {
    /// Rows across all model inputs
    pub fn channels(&self) -> usize {
        match self {
            FeatureKind::Chroma => N_CHROMA,
            FeatureKind::Mfcc => N_MFCC,
            FeatureKind::Both => N_MFCC + N_CHROMA,
        }
    }

    /// Whether the model takes MFCC and chroma windows together
    pub fn is_paired(&self) -> bool {
        matches!(self, FeatureKind::Both)
    }
}

/// Feature matrices for one clip, one per model input
#[derive(Debug, Clone, PartialEq)]
pub enum Features {
    Single(FeatureMatrix),
    /// Two representations of the same frames
    Paired {
        mfcc: FeatureMatrix,
        chroma: FeatureMatrix,
    },
}

impl Features {
    /// STFT frames covered by the features
    pub fn frames(&self) -> usize {
        match self {
            Features::Single(matrix) => matrix.ncols(),
            Features::Paired { mfcc, .. } => mfcc.ncols(),
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Chroma => write!(f, "chroma"),
            FeatureKind::Mfcc => write!(f, "mfcc"),
            FeatureKind::Both => write!(f, "both"),
        }
    }
}

impl FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chroma" => Ok(FeatureKind::Chroma),
            "mfcc" => Ok(FeatureKind::Mfcc),
            "both" => Ok(FeatureKind::Both),
            other => Err(format!("unknown feature kind '{}' (chroma, mfcc, both)", other)),
        }
    }
}

/// Compute the features a model of `kind` consumes
pub fn extract(signal: &Signal, kind: FeatureKind) -> Features {
    let features = match kind {
        FeatureKind::Chroma => Features::Single(chroma_stft(signal)),
        FeatureKind::Mfcc => Features::Single(mfcc(signal)),
        FeatureKind::Both => Features::Paired {
            mfcc: mfcc(signal),
            chroma: chroma_stft(signal),
        },
    };

    debug!(
        "Extracted {} features: {} channels x {} frames",
        kind,
        kind.channels(),
        features.frames()
    );

    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SAMPLE_RATE;

    #[test]
    fn test_extract_channel_counts() {
        let signal = Signal::sine(440.0, 0.5, SAMPLE_RATE);
        for kind in [FeatureKind::Chroma, FeatureKind::Mfcc] {
            match extract(&signal, kind) {
                Features::Single(features) => {
                    assert_eq!(features.nrows(), kind.channels());
                    assert_eq!(features.ncols(), frame_count(signal.len()));
                }
                Features::Paired { .. } => panic!("{} should be a single input", kind),
            }
        }
    }

    #[test]
    fn test_extract_both_shares_frames() {
        let signal = Signal::sine(440.0, 0.5, SAMPLE_RATE);
        match extract(&signal, FeatureKind::Both) {
            Features::Paired { mfcc, chroma } => {
                assert_eq!(mfcc.nrows(), N_MFCC);
                assert_eq!(chroma.nrows(), N_CHROMA);
                assert_eq!(mfcc.ncols(), chroma.ncols());
                assert_eq!(mfcc.ncols(), frame_count(signal.len()));
            }
            Features::Single(_) => panic!("both should pair two inputs"),
        }
        assert_eq!(FeatureKind::Both.channels(), 32);
    }

    #[test]
    fn test_feature_kind_parse() {
        assert_eq!("chroma".parse::<FeatureKind>(), Ok(FeatureKind::Chroma));
        assert_eq!("MFCC".parse::<FeatureKind>(), Ok(FeatureKind::Mfcc));
        assert_eq!("both".parse::<FeatureKind>(), Ok(FeatureKind::Both));
        assert!("spectral".parse::<FeatureKind>().is_err());
        assert_eq!(FeatureKind::default(), FeatureKind::Chroma);
    }

    #[test]
    fn test_feature_kind_serde() {
        let json = serde_json::to_string(&FeatureKind::Mfcc).unwrap();
        assert_eq!(json, "\"mfcc\"");
        let kind: FeatureKind = serde_json::from_str("\"chroma\"").unwrap();
        assert_eq!(kind, FeatureKind::Chroma);
    }
}
