//! Signal buffer
//!
//! A `Signal` is the mono sample sequence every later stage works from.
//! It is created by the loader (or by a test generator) and never mutated.

// ============================================================================
// Constants
// ============================================================================

/// Sample rate of every signal entering the pipeline (22.05kHz)
pub const SAMPLE_RATE: u32 = 22050;

// ============================================================================
// Signal
// ============================================================================

/// Mono audio at a known sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Signal {
    /// Wrap already-decoded mono samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// A run of zero samples lasting `duration_secs` at `sample_rate`
    pub fn silence(duration_secs: f32, sample_rate: u32) -> Self {
        let num_samples = (duration_secs * sample_rate as f32) as usize;
        Self::new(vec![0.0; num_samples], sample_rate)
    }

    /// Generate a test tone (sine wave)
    ///
    /// Useful for exercising the filter and feature stages with a known pitch.
    pub fn sine(frequency: f32, duration_secs: f32, sample_rate: u32) -> Self {
        let num_samples = (duration_secs * sample_rate as f32) as usize;
        let angular_freq = 2.0 * std::f64::consts::PI * frequency as f64 / sample_rate as f64;

        let samples = (0..num_samples)
            .map(|i| (angular_freq * i as f64).sin() as f32 * 0.5)
            .collect();

        Self::new(samples, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Peak absolute sample value. Returns 0.0 for empty signals.
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    /// RMS level (linear). Returns 0.0 for empty signals.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_squares / self.samples.len() as f64).sqrt() as f32
    }
}

// ============================================================================
// Tests
// ============================================================================
