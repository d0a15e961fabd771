//! Tuning estimation
//!
//! Finds how far a recording sits from A440 equal temperament, in fractions
//! of a semitone. Spectral peaks between 150 and 4000 Hz are located with
//! quadratic interpolation, the weaker half is dropped, and the offsets of
//! the rest from the nearest semitone are histogrammed at 0.01 resolution.
//! The estimate is the left edge of the fullest bin, in `[-0.5, 0.5)`.

use ndarray::{Array2, Axis};

/// Lowest peak frequency considered
const FMIN_HZ: f64 = 150.0;

/// Highest peak frequency considered (capped at Nyquist)
const FMAX_HZ: f64 = 4000.0;

/// Peaks below this fraction of their frame's maximum are ignored
const PEAK_THRESHOLD: f64 = 0.1;

/// Histogram resolution in semitones
const RESOLUTION: f64 = 0.01;

/// A0, the octave reference for semitone positions
const A0_HZ: f64 = 27.5;

/// Estimate the tuning offset of a power spectrogram, shape `(n_fft / 2 + 1, frames)`
///
/// Returns 0 when no peak is found, which includes silence.
pub fn estimate_tuning(power: &Array2<f64>, sample_rate: u32, n_fft: usize) -> f64 {
    let peaks = spectral_peaks(power, sample_rate, n_fft);
    if peaks.is_empty() {
        return 0.0;
    }

    let magnitudes: Vec<f64> = peaks.iter().map(|&(_, mag)| mag).collect();
    let threshold = median(&magnitudes);

    let strong: Vec<f64> = peaks
        .into_iter()
        .filter(|&(_, mag)| mag >= threshold)
        .map(|(freq, _)| freq)
        .collect();

    pitch_tuning(&strong)
}

/// Interpolated `(frequency, magnitude)` of every local spectral maximum
fn spectral_peaks(power: &Array2<f64>, sample_rate: u32, n_fft: usize) -> Vec<(f64, f64)> {
    let bins = power.nrows();
    let bin_hz = sample_rate as f64 / n_fft as f64;
    let fmax = FMAX_HZ.min(sample_rate as f64 / 2.0);

    let mut peaks = Vec::new();
    if bins < 3 {
        return peaks;
    }

    for column in power.axis_iter(Axis(1)) {
        let floor = PEAK_THRESHOLD * column.iter().fold(0.0f64, |acc, &v| acc.max(v));
        let gated = |k: usize| if column[k] > floor { column[k] } else { 0.0 };

        // DC and Nyquist always fall outside the band
        for k in 1..bins - 1 {
            let freq = k as f64 * bin_hz;
            if freq < FMIN_HZ || freq >= fmax {
                continue;
            }

            let here = gated(k);
            if !(here > gated(k - 1) && here >= gated(k + 1)) {
                continue;
            }

            let (below, above) = (column[k - 1], column[k + 1]);
            let avg = 0.5 * (above - below);
            let curvature = 2.0 * column[k] - above - below;
            let shift = if curvature.abs() < f64::MIN_POSITIVE {
                avg / (curvature + 1.0)
            } else {
                avg / curvature
            };

            let pitch = (k as f64 + shift) * bin_hz;
            if pitch > 0.0 {
                peaks.push((pitch, column[k] + 0.5 * avg * shift));
            }
        }
    }

    peaks
}

/// Most common offset from the nearest semitone
fn pitch_tuning(frequencies: &[f64]) -> f64 {
    let n_bins = (1.0 / RESOLUTION).ceil() as usize;
    let mut counts = vec![0usize; n_bins];
    let mut any = false;

    for &freq in frequencies.iter().filter(|&&f| f > 0.0) {
        let mut residual = (12.0 * (freq / A0_HZ).log2()).rem_euclid(1.0);
        if residual >= 0.5 {
            residual -= 1.0;
        }

        let bin = (((residual + 0.5) / RESOLUTION).floor() as usize).min(n_bins - 1);
        counts[bin] += 1;
        any = true;
    }

    if !any {
        return 0.0;
    }

    // first fullest bin wins ties
    let best = counts
        .iter()
        .enumerate()
        .fold(0, |best, (i, &c)| if c > counts[best] { i } else { best });

    -0.5 + best as f64 * RESOLUTION
}

/// Median, averaging the middle pair for an even count
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Signal, SAMPLE_RATE};
    use crate::features::stft::{power_spectrogram, N_FFT};
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    fn bin_centre(k: usize) -> f32 {
        (k as f64 * SAMPLE_RATE as f64 / N_FFT as f64) as f32
    }

    fn semitone_offset(freq: f64) -> f64 {
        let r = (12.0 * (freq / A0_HZ).log2()).rem_euclid(1.0);
        if r >= 0.5 {
            r - 1.0
        } else {
            r
        }
    }

    #[test]
    fn test_silence_has_no_tuning() {
        let power = power_spectrogram(Signal::silence(1.0, SAMPLE_RATE).samples());
        assert_eq!(estimate_tuning(&power, SAMPLE_RATE, N_FFT), 0.0);
    }

    // 441.4Hz sits 0.056 semitones sharp of A, 463.0Hz sits 0.119 flat of A#
    #[test_case(41 ; "slightly sharp")]
    #[test_case(43 ; "flat")]
    fn test_detuned_tone(k: usize) {
        let freq = bin_centre(k);
        let power = power_spectrogram(Signal::sine(freq, 1.0, SAMPLE_RATE).samples());

        let tuning = estimate_tuning(&power, SAMPLE_RATE, N_FFT);
        assert_abs_diff_eq!(tuning, semitone_offset(freq as f64), epsilon = 0.015);
    }

    #[test]
    fn test_in_tune_peak_gives_zero_bin() {
        assert_abs_diff_eq!(pitch_tuning(&[440.0, 880.0, 220.0]), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_histogram_prefers_majority() {
        // two pitches 0.3 semitones sharp outvote one in tune
        let sharp = 440.0 * 2f64.powf(0.305 / 12.0);
        let tuning = pitch_tuning(&[sharp, sharp * 2.0, 440.0]);
        assert_abs_diff_eq!(tuning, 0.30, epsilon = 1e-9);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
