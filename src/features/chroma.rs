//! Chroma energy features
//!
//! Folds the power spectrogram into 12 pitch classes (C, C#, ..., B).
//! Each FFT bin contributes to nearby pitch classes through a Gaussian bump
//! one bin-width wide, weighted towards the middle octaves. The pitch grid
//! follows the recording's estimated tuning rather than a fixed A440.

use log::debug;
use ndarray::{Array2, Axis};

use super::stft::{power_spectrogram, N_FFT};
use super::tuning::estimate_tuning;
use crate::engine::Signal;

/// Pitch classes per octave
pub const N_CHROMA: usize = 12;

/// Centre of the octave weighting (octave 5, around 880Hz)
const CENTER_OCTAVE: f64 = 5.0;

/// Gaussian half-width of the octave weighting, in octaves
const OCTAVE_WIDTH: f64 = 2.0;

/// Reference pitch (A4) in Hz at tuning offset 0
const A4_HZ: f64 = 440.0;

/// Chroma filter bank, shape `(N_CHROMA, n_fft / 2 + 1)`
///
/// `tuning` shifts the pitch grid, in fractions of a semitone.
pub fn chroma_filter_bank(sample_rate: u32, n_fft: usize, tuning: f64) -> Array2<f64> {
    let n_chroma = N_CHROMA as f64;
    let a0 = A4_HZ * 2f64.powf(tuning / n_chroma) / 16.0;

    // Position of every FFT bin above DC in semitones above A0
    let mut frqbins: Vec<f64> = (1..n_fft)
        .map(|k| {
            let freq = k as f64 * sample_rate as f64 / n_fft as f64;
            n_chroma * (freq / a0).log2()
        })
        .collect();
    // DC has no pitch; place it 1.5 octaves below the first bin
    frqbins.insert(0, frqbins[0] - 1.5 * n_chroma);

    let mut binwidths: Vec<f64> = frqbins
        .windows(2)
        .map(|w| (w[1] - w[0]).max(1.0))
        .collect();
    binwidths.push(1.0);

    let half = (n_chroma / 2.0).round();
    let mut weights = Array2::<f64>::zeros((N_CHROMA, n_fft));

    for (bin, (&pos, &width)) in frqbins.iter().zip(&binwidths).enumerate() {
        for chroma in 0..N_CHROMA {
            let d = (pos - chroma as f64 + half + 10.0 * n_chroma).rem_euclid(n_chroma) - half;
            weights[[chroma, bin]] = (-0.5 * (2.0 * d / width).powi(2)).exp();
        }
    }

    // Unit L2 norm per bin
    for mut column in weights.axis_iter_mut(Axis(1)) {
        let norm = column.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > f64::MIN_POSITIVE {
            column.mapv_inplace(|v| v / norm);
        }
    }

    for (bin, &pos) in frqbins.iter().enumerate() {
        let octave = pos / n_chroma;
        let octave_weight = (-0.5 * ((octave - CENTER_OCTAVE) / OCTAVE_WIDTH).powi(2)).exp();
        weights.column_mut(bin).mapv_inplace(|v| v * octave_weight);
    }

    // Rows are A-based so far; rotate so row 0 is C
    let num_bins = n_fft / 2 + 1;
    let mut bank = Array2::<f64>::zeros((N_CHROMA, num_bins));
    for chroma in 0..N_CHROMA {
        let source = (chroma + 3) % N_CHROMA;
        for bin in 0..num_bins {
            bank[[chroma, bin]] = weights[[source, bin]];
        }
    }

    bank
}

/// Chromagram of a signal, shape `(12, frames)`
///
/// Every column is scaled so its largest entry is 1. Silent columns stay
/// at zero.
pub fn chroma_stft(signal: &Signal) -> Array2<f32> {
    let spectrogram = power_spectrogram(signal.samples());
    let tuning = estimate_tuning(&spectrogram, signal.sample_rate(), N_FFT);
    debug!("Estimated tuning {:+.2} semitones", tuning);
    let bank = chroma_filter_bank(signal.sample_rate(), N_FFT, tuning);

    let mut chroma = bank.dot(&spectrogram);

    for mut column in chroma.axis_iter_mut(Axis(1)) {
        let peak = column.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        if peak > f64::MIN_POSITIVE {
            column.mapv_inplace(|v| v / peak);
        }
    }

    chroma.mapv(|v| v as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SAMPLE_RATE;
    use approx::assert_abs_diff_eq;

    fn argmax(values: impl Iterator<Item = f32>) -> usize {
        values
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_filter_bank_shape() {
        let bank = chroma_filter_bank(SAMPLE_RATE, N_FFT, 0.0);
        assert_eq!(bank.dim(), (12, 1025));
        assert!(bank.iter().all(|&v| v >= 0.0 && v.is_finite()));
    }

    #[test]
    fn test_tuning_moves_the_pitch_grid() {
        // bin 41 (441.4Hz) falls between G# and A once the grid is tuned 0.5 sharp
        let in_tune = chroma_filter_bank(SAMPLE_RATE, N_FFT, 0.0);
        let sharp = chroma_filter_bank(SAMPLE_RATE, N_FFT, 0.5);

        assert!(in_tune[[9, 41]] > in_tune[[10, 41]]);
        assert!(sharp[[9, 41]] < in_tune[[9, 41]]);
        assert!(sharp[[8, 41]] < sharp[[9, 41]]);
    }

    #[test]
    fn test_chroma_shape_tracks_duration() {
        let one_sec = chroma_stft(&Signal::silence(1.0, SAMPLE_RATE));
        assert_eq!(one_sec.dim(), (12, 44));

        let ten_sec = chroma_stft(&Signal::silence(10.0, SAMPLE_RATE));
        assert_eq!(ten_sec.dim(), (12, 431));
    }

    #[test]
    fn test_silence_is_zero() {
        let chroma = chroma_stft(&Signal::silence(0.5, SAMPLE_RATE));
        assert!(chroma.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_a440_lands_on_a() {
        let chroma = chroma_stft(&Signal::sine(440.0, 1.0, SAMPLE_RATE));

        for frame in 5..35 {
            let column = chroma.column(frame);
            assert_eq!(argmax(column.iter().copied()), 9, "frame {}", frame);
            assert_abs_diff_eq!(column[9], 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_c5_lands_on_c() {
        let chroma = chroma_stft(&Signal::sine(523.25, 1.0, SAMPLE_RATE));
        let column = chroma.column(20);
        assert_eq!(argmax(column.iter().copied()), 0);
    }

    #[test]
    fn test_deterministic() {
        let tone = Signal::sine(660.0, 0.5, SAMPLE_RATE);
        assert_eq!(chroma_stft(&tone), chroma_stft(&tone));
    }
}
