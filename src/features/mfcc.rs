//! Mel-frequency cepstral coefficients
//!
//! Slaney-style mel filter bank over the power spectrogram, log compression
//! with an 80dB floor below the loudest cell, then an orthonormal DCT-II.

use ndarray::{Array2, Axis};
use std::f64::consts::PI;

use super::stft::{power_spectrogram, N_FFT};
use crate::engine::Signal;

/// Mel bands feeding the DCT
pub const N_MELS: usize = 128;

/// Coefficients kept per frame
pub const N_MFCC: usize = 20;

const AMIN: f64 = 1e-10;
const TOP_DB: f64 = 80.0;

// Slaney mel scale: linear below 1kHz, logarithmic above
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filter bank with area normalization,
/// shape `(n_mels, n_fft / 2 + 1)`, spanning 0Hz to Nyquist
pub fn mel_filter_bank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f64> {
    let num_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..num_bins)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut bank = Array2::<f64>::zeros((n_mels, num_bins));
    for m in 0..n_mels {
        let (left, center, right) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
        let enorm = 2.0 / (right - left);

        for (bin, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);
            bank[[m, bin]] = lower.min(upper).max(0.0) * enorm;
        }
    }

    bank
}

/// Power to decibels (reference 1.0), floored `TOP_DB` below the matrix peak
fn power_to_db(power: &Array2<f64>) -> Array2<f64> {
    let mut db = power.mapv(|p| 10.0 * p.max(AMIN).log10());
    let peak = db.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - TOP_DB;
    db.mapv_inplace(|v| v.max(floor));
    db
}

/// Orthonormal DCT-II along rows, first `n_out` coefficients
fn dct_ortho(input: &Array2<f64>, n_out: usize) -> Array2<f64> {
    let n = input.len_of(Axis(0));
    let mut basis = Array2::<f64>::zeros((n_out, n));
    for k in 0..n_out {
        let scale = if k == 0 {
            (1.0 / n as f64).sqrt()
        } else {
            (2.0 / n as f64).sqrt()
        };
        for i in 0..n {
            basis[[k, i]] = scale * (PI * k as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos();
        }
    }
    basis.dot(input)
}

/// MFCC matrix of a signal, shape `(N_MFCC, frames)`
pub fn mfcc(signal: &Signal) -> Array2<f32> {
    let spectrogram = power_spectrogram(signal.samples());
    let bank = mel_filter_bank(signal.sample_rate(), N_FFT, N_MELS);

    let mel = bank.dot(&spectrogram);
    let log_mel = power_to_db(&mel);

    dct_ortho(&log_mel, N_MFCC).mapv(|v| v as f32)
}
