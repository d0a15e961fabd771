//! Short-time Fourier transform
//!
//! Centered frames (half a window of zero padding on each side), periodic
//! Hann window, power magnitudes.

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// FFT window size
pub const N_FFT: usize = 2048;

/// Hop between consecutive frames
pub const HOP_LENGTH: usize = 512;

/// Number of frames produced for `num_samples` samples
pub fn frame_count(num_samples: usize) -> usize {
    1 + num_samples / HOP_LENGTH
}

/// Power spectrogram `|X|^2`, shape `(N_FFT / 2 + 1, frames)`
pub fn power_spectrogram(samples: &[f32]) -> Array2<f64> {
    let pad = N_FFT / 2;
    let mut padded = vec![0.0f64; samples.len() + 2 * pad];
    for (dst, &src) in padded[pad..].iter_mut().zip(samples) {
        *dst = src as f64;
    }

    let window: Vec<f64> = (0..N_FFT)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / N_FFT as f64).cos())
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(N_FFT);

    let num_bins = N_FFT / 2 + 1;
    let num_frames = frame_count(samples.len());
    let mut spectrogram = Array2::<f64>::zeros((num_bins, num_frames));
    let mut buffer = vec![Complex::new(0.0, 0.0); N_FFT];

    for frame in 0..num_frames {
        let start = frame * HOP_LENGTH;
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = Complex::new(padded[start + i] * window[i], 0.0);
        }

        fft.process(&mut buffer);

        for (bin, value) in buffer.iter().take(num_bins).enumerate() {
            spectrogram[[bin, frame]] = value.norm_sqr();
        }
    }

    spectrogram
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_scales_with_duration() {
        assert_eq!(frame_count(22050), 44);
        assert_eq!(frame_count(220500), 431);
        assert_eq!(frame_count(0), 1);
    }

    #[test]
    fn test_spectrogram_shape() {
        let samples = vec![0.0f32; 22050];
        let spec = power_spectrogram(&samples);
        assert_eq!(spec.dim(), (1025, 44));
        assert!(spec.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_tone_peaks_at_expected_bin() {
        let sr = 22050.0;
        let freq = 1000.0;
        let samples: Vec<f32> = (0..22050)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sr).sin() as f32)
            .collect();
        let spec = power_spectrogram(&samples);

        let column = spec.column(20);
        let peak_bin = column
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();

        // 1000Hz / (22050 / 2048) = bin 92.9
        assert_eq!(peak_bin, 93);
    }
}
