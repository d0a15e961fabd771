//! Butterworth band-pass filter
//!
//! Restricts a signal to the vocal band before feature extraction.
//! Coefficients are designed digitally (analog prototype, band transform,
//! bilinear transform) and applied forward and backward so the output has
//! no phase shift.

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use crate::engine::Signal;
use crate::error::{MaqamError, Result};

/// Lower edge of the vocal band in Hz
pub const LOW_CUTOFF_HZ: f64 = 300.0;

/// Upper edge of the vocal band in Hz
pub const HIGH_CUTOFF_HZ: f64 = 3400.0;

/// Butterworth prototype order
pub const FILTER_ORDER: usize = 5;

/// Transfer function coefficients
/// H(z) = (b0 + b1*z^-1 + ... ) / (a0 + a1*z^-1 + ...), with a0 = 1
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCoeffs {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

impl TransferCoeffs {
    /// Magnitude response at `frequency` Hz for the given sample rate
    pub fn magnitude_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let eval = |coeffs: &[f64]| {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, &c)| Complex64::from_polar(c, -w * k as f64))
                .sum::<Complex64>()
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }

    /// Steady-state filter state for a unit step input
    ///
    /// Scaled by the first input sample, this starts the filter as if the
    /// signal had been constant forever, which suppresses start-up transients.
    fn step_initial_state(&self) -> Vec<f64> {
        let (b, a) = (&self.b, &self.a);
        let n = a.len().max(b.len());
        if n < 2 {
            return Vec::new();
        }

        let coeff = |v: &[f64], k: usize| v.get(k).copied().unwrap_or(0.0);
        let mut zi = vec![0.0; n - 1];

        let b_sum: f64 = (1..n).map(|k| coeff(b, k) - coeff(a, k) * b[0]).sum();
        let a_sum: f64 = (0..n).map(|k| coeff(a, k)).sum();
        zi[0] = b_sum / a_sum;

        let mut asum = 1.0;
        let mut csum = 0.0;
        for k in 1..n - 1 {
            asum += coeff(a, k);
            csum += coeff(b, k) - coeff(a, k) * b[0];
            zi[k] = asum * zi[0] - csum;
        }

        zi
    }

    /// Direct Form II transposed, starting from state `zi`
    fn lfilter(&self, input: &[f64], zi: &[f64]) -> Vec<f64> {
        let (b, a) = (&self.b, &self.a);
        let order = zi.len();
        let coeff = |v: &[f64], k: usize| v.get(k).copied().unwrap_or(0.0);

        let mut state = zi.to_vec();
        let mut output = Vec::with_capacity(input.len());

        for &x in input {
            let y = b[0] * x + state.first().copied().unwrap_or(0.0);
            for i in 0..order {
                let next = if i + 1 < order { state[i + 1] } else { 0.0 };
                state[i] = coeff(b, i + 1) * x - coeff(a, i + 1) * y + next;
            }
            output.push(y);
        }

        output
    }
}

/// Zero-phase Butterworth band-pass filter
#[derive(Debug, Clone)]
pub struct BandPass {
    low_hz: f64,
    high_hz: f64,
    order: usize,
    sample_rate: u32,
    coeffs: TransferCoeffs,
}

impl BandPass {
    /// Design a band-pass filter
    ///
    /// # Errors
    /// `Filter` if the order is zero or the cutoffs do not satisfy
    /// `0 < low < high < sample_rate / 2`.
    pub fn new(low_hz: f64, high_hz: f64, order: usize, sample_rate: u32) -> Result<Self> {
        let nyquist = 0.5 * sample_rate as f64;

        if order == 0 {
            return Err(MaqamError::filter("filter order must be at least 1"));
        }
        if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist) {
            return Err(MaqamError::filter(format!(
                "cutoffs {}-{}Hz invalid for {}Hz sample rate (need 0 < low < high < {}Hz)",
                low_hz, high_hz, sample_rate, nyquist
            )));
        }

        let coeffs = design_butter_bandpass(order, low_hz / nyquist, high_hz / nyquist);

        Ok(Self {
            low_hz,
            high_hz,
            order,
            sample_rate,
            coeffs,
        })
    }

    /// The 300-3400Hz, 5th-order filter used by the classification pipeline
    pub fn vocal(sample_rate: u32) -> Result<Self> {
        Self::new(LOW_CUTOFF_HZ, HIGH_CUTOFF_HZ, FILTER_ORDER, sample_rate)
    }

    pub fn coeffs(&self) -> &TransferCoeffs {
        &self.coeffs
    }

    pub fn cutoffs(&self) -> (f64, f64) {
        (self.low_hz, self.high_hz)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Samples of odd extension added at each end before filtering.
    /// Inputs must be strictly longer than this.
    pub fn pad_len(&self) -> usize {
        3 * self.coeffs.a.len().max(self.coeffs.b.len())
    }

    /// Filter a signal, returning a new signal of the same length
    ///
    /// # Errors
    /// `Filter` if the signal's sample rate differs from the design rate or
    /// the signal is not longer than `pad_len()`.
    pub fn apply(&self, signal: &Signal) -> Result<Signal> {
        if signal.sample_rate() != self.sample_rate {
            return Err(MaqamError::filter(format!(
                "filter designed for {}Hz, signal is {}Hz",
                self.sample_rate,
                signal.sample_rate()
            )));
        }

        let filtered = self.filtfilt(signal.samples())?;
        Ok(Signal::new(filtered, self.sample_rate))
    }

    /// Forward-backward filtering with odd-extension padding
    pub fn filtfilt(&self, samples: &[f32]) -> Result<Vec<f32>> {
        let edge = self.pad_len();
        if samples.len() <= edge {
            return Err(MaqamError::filter(format!(
                "input of {} samples is too short; need more than {}",
                samples.len(),
                edge
            )));
        }

        let x: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let ext = odd_extend(&x, edge);
        let zi = self.coeffs.step_initial_state();

        let x0 = ext[0];
        let zi_fwd: Vec<f64> = zi.iter().map(|z| z * x0).collect();
        let mut y = self.coeffs.lfilter(&ext, &zi_fwd);

        y.reverse();
        let y0 = y[0];
        let zi_back: Vec<f64> = zi.iter().map(|z| z * y0).collect();
        let mut y = self.coeffs.lfilter(&y, &zi_back);
        y.reverse();

        Ok(y[edge..y.len() - edge].iter().map(|&v| v as f32).collect())
    }
}

// ============================================================================
// Coefficient design
// ============================================================================

/// Digital Butterworth band-pass with edges given as fractions of Nyquist
fn design_butter_bandpass(order: usize, low: f64, high: f64) -> TransferCoeffs {
    // Analog low-pass prototype poles on the unit circle, no zeros, unity gain
    let prototype: Vec<Complex64> = (0..order)
        .map(|k| {
            let m = -(order as f64) + 1.0 + 2.0 * k as f64;
            -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64))
        })
        .collect();

    // Pre-warp the edges for the bilinear transform (normalized fs = 2)
    let fs = 2.0;
    let warp = |w: f64| 2.0 * fs * (PI * w / fs).tan();
    let (w1, w2) = (warp(low), warp(high));
    let bw = w2 - w1;
    let wo = (w1 * w2).sqrt();

    // Low-pass to band-pass: each pole splits into a pair, `order` zeros at s = 0
    let mut poles = Vec::with_capacity(2 * order);
    for &p in &prototype {
        let p_lp = p * (bw / 2.0);
        let root = (p_lp * p_lp - wo * wo).sqrt();
        poles.push(p_lp + root);
    }
    for &p in &prototype {
        let p_lp = p * (bw / 2.0);
        let root = (p_lp * p_lp - wo * wo).sqrt();
        poles.push(p_lp - root);
    }
    let gain = bw.powi(order as i32);

    // Bilinear transform: s = 0 zeros map to z = 1, zeros at infinity to z = -1
    let fs2 = 2.0 * fs;
    let digital_poles: Vec<Complex64> = poles
        .iter()
        .map(|&p| (fs2 + p) / (fs2 - p))
        .collect();
    let mut digital_zeros = vec![Complex64::new(1.0, 0.0); order];
    digital_zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(order));

    let denom: Complex64 = poles.iter().map(|&p| fs2 - p).product();
    let digital_gain = gain * (Complex64::new(fs2.powi(order as i32), 0.0) / denom).re;

    let b = poly(&digital_zeros)
        .into_iter()
        .map(|c| c.re * digital_gain)
        .collect();
    let a = poly(&digital_poles).into_iter().map(|c| c.re).collect();

    TransferCoeffs { b, a }
}

/// Polynomial coefficients (highest power first) with the given roots
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &r in roots {
        let mut next = coeffs.clone();
        next.push(Complex64::new(0.0, 0.0));
        for i in 1..next.len() {
            next[i] -= r * coeffs[i - 1];
        }
        coeffs = next;
    }
    coeffs
}

/// Odd extension: reflect `edge` samples about each endpoint
fn odd_extend(x: &[f64], edge: usize) -> Vec<f64> {
    let n = x.len();
    let first = x[0];
    let last = x[n - 1];

    let mut ext = Vec::with_capacity(n + 2 * edge);
    ext.extend((1..=edge).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=edge).map(|i| 2.0 * last - x[n - 1 - i]));
    ext
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SAMPLE_RATE;
    use approx::assert_abs_diff_eq;

    fn middle_rms(samples: &[f32]) -> f32 {
        let quarter = samples.len() / 4;
        let mid = &samples[quarter..samples.len() - quarter];
        (mid.iter().map(|s| s * s).sum::<f32>() / mid.len() as f32).sqrt()
    }

    #[test]
    fn test_coefficient_shape() {
        let filter = BandPass::vocal(SAMPLE_RATE).unwrap();
        let coeffs = filter.coeffs();

        assert_eq!(coeffs.b.len(), 2 * FILTER_ORDER + 1);
        assert_eq!(coeffs.a.len(), 2 * FILTER_ORDER + 1);
        assert_abs_diff_eq!(coeffs.a[0], 1.0, epsilon = 1e-12);
        assert_eq!(filter.pad_len(), 33);
    }

    #[test]
    fn test_frequency_response() {
        let filter = BandPass::vocal(SAMPLE_RATE).unwrap();
        let sr = SAMPLE_RATE as f64;
        let coeffs = filter.coeffs();

        // Band-pass blocks DC and Nyquist
        assert!(coeffs.magnitude_at(0.0, sr) < 1e-6);
        assert!(coeffs.magnitude_at(sr / 2.0, sr) < 1e-6);

        // Flat in the voice band
        assert_abs_diff_eq!(coeffs.magnitude_at(1000.0, sr), 1.0, epsilon = 0.01);

        // Butterworth edges sit at -3dB
        assert_abs_diff_eq!(
            coeffs.magnitude_at(LOW_CUTOFF_HZ, sr),
            std::f64::consts::FRAC_1_SQRT_2,
            epsilon = 1e-3
        );
        assert_abs_diff_eq!(
            coeffs.magnitude_at(HIGH_CUTOFF_HZ, sr),
            std::f64::consts::FRAC_1_SQRT_2,
            epsilon = 1e-3
        );

        assert!(coeffs.magnitude_at(50.0, sr) < 1e-3);
        assert!(coeffs.magnitude_at(8000.0, sr) < 0.02);
    }

    #[test]
    fn test_passband_tone_preserved() {
        let filter = BandPass::vocal(SAMPLE_RATE).unwrap();
        let tone = Signal::sine(1000.0, 1.0, SAMPLE_RATE);
        let filtered = filter.apply(&tone).unwrap();

        assert_eq!(filtered.len(), tone.len());
        let ratio = middle_rms(filtered.samples()) / middle_rms(tone.samples());
        assert!((ratio - 1.0).abs() < 0.02, "passband ratio {}", ratio);
    }

    #[test]
    fn test_stopband_tone_removed() {
        let filter = BandPass::vocal(SAMPLE_RATE).unwrap();
        let rumble = Signal::sine(50.0, 1.0, SAMPLE_RATE);
        let filtered = filter.apply(&rumble).unwrap();

        let ratio = middle_rms(filtered.samples()) / middle_rms(rumble.samples());
        assert!(ratio < 0.01, "stopband ratio {}", ratio);
    }

    #[test]
    fn test_silence_stays_silent() {
        let filter = BandPass::vocal(SAMPLE_RATE).unwrap();
        let filtered = filter.apply(&Signal::silence(0.5, SAMPLE_RATE)).unwrap();
        assert!(filtered.samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_input_shorter_than_pad_is_error() {
        let filter = BandPass::vocal(SAMPLE_RATE).unwrap();

        let err = filter.filtfilt(&[0.0; 33]).unwrap_err();
        assert!(matches!(err, MaqamError::Filter { .. }));
        assert!(filter.filtfilt(&[0.0; 34]).is_ok());
        assert!(filter.filtfilt(&[]).is_err());
    }

    #[test]
    fn test_invalid_cutoffs() {
        // High cutoff at or above Nyquist
        assert!(BandPass::new(300.0, 4000.0, 5, 8000).is_err());
        assert!(BandPass::new(300.0, 3400.0, 5, 8000).is_ok());
        assert!(BandPass::new(300.0, 3400.0, 5, 6000).is_err());
        // Reversed or non-positive edges
        assert!(BandPass::new(3400.0, 300.0, 5, SAMPLE_RATE).is_err());
        assert!(BandPass::new(0.0, 3400.0, 5, SAMPLE_RATE).is_err());
        assert!(BandPass::new(300.0, 3400.0, 0, SAMPLE_RATE).is_err());
    }

    #[test]
    fn test_sample_rate_mismatch() {
        let filter = BandPass::vocal(SAMPLE_RATE).unwrap();
        let other = Signal::sine(1000.0, 0.1, 16000);
        assert!(filter.apply(&other).is_err());
    }

    #[test]
    fn test_odd_extend() {
        let x = [1.0, 2.0, 4.0, 7.0];
        let ext = odd_extend(&x, 2);
        assert_eq!(ext, vec![-2.0, 0.0, 1.0, 2.0, 4.0, 7.0, 10.0, 12.0]);
    }

    #[test]
    fn test_step_initial_state_is_steady() {
        // A constant input starting from the scaled steady state produces a
        // constant output equal to the DC gain (zero for a band-pass).
        let filter = BandPass::vocal(SAMPLE_RATE).unwrap();
        let coeffs = filter.coeffs();
        let zi = coeffs.step_initial_state();

        let y = coeffs.lfilter(&[1.0; 64], &zi);
        for v in y {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-9);
        }
    }
}
