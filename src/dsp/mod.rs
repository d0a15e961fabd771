//! DSP Module
//!
//! Signal conditioning applied before feature extraction.

mod bandpass;

pub use bandpass::{
    BandPass, TransferCoeffs, FILTER_ORDER, HIGH_CUTOFF_HZ, LOW_CUTOFF_HZ,
};
