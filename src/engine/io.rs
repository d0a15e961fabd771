//! Signal loader
//!
//! Decodes WAV audio into a mono `Signal` at the pipeline sample rate.
//! Multi-channel input is averaged down to mono and other sample rates are
//! converted with a windowed-sinc resampler, which low-passes below the new
//! Nyquist so nothing above 11kHz folds back into the vocal band.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::engine::buffer::{Signal, SAMPLE_RATE};
use crate::error::{MaqamError, Result};

/// Sample encoding used when writing a WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavEncoding {
    /// 16-bit signed integer PCM
    #[default]
    Int16,
    /// 32-bit IEEE float
    Float32,
}

/// Load an audio file as a mono signal at `SAMPLE_RATE`
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `Decode` - If the file cannot be opened, is not valid WAV or contains
///   no samples
pub fn load_signal(path: &Path) -> Result<Signal> {
    if !path.exists() {
        return Err(MaqamError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let file = File::open(path).map_err(|e| MaqamError::Decode {
        reason: format!("Cannot open {}: {}", path.display(), e),
        source: Some(Box::new(e)),
    })?;
    let signal = load_signal_from_reader(BufReader::new(file))?;

    debug!(
        "Loaded {} ({} samples, {:.2}s)",
        path.display(),
        signal.len(),
        signal.duration_secs()
    );

    Ok(signal)
}

/// Load a mono signal from any byte stream holding a WAV file
///
/// Recorded clips arrive as raw bytes rather than files; this is the entry
/// point for those.
pub fn load_signal_from_reader<R: Read>(reader: R) -> Result<Signal> {
    let reader = WavReader::new(reader).map_err(|e| MaqamError::Decode {
        reason: format!("Failed to open WAV stream: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let source_sample_rate = spec.sample_rate;
    let channels = spec.channels as usize;

    if channels == 0 || source_sample_rate == 0 {
        return Err(MaqamError::decode(format!(
            "invalid WAV header ({} channels at {}Hz)",
            channels, source_sample_rate
        )));
    }

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    if interleaved.len() < channels {
        return Err(MaqamError::decode("audio contains no samples"));
    }

    let mono = downmix(&interleaved, channels);

    let samples = if source_sample_rate != SAMPLE_RATE {
        debug!("Resampling {}Hz -> {}Hz", source_sample_rate, SAMPLE_RATE);
        resample(&mono, source_sample_rate, SAMPLE_RATE)?
    } else {
        mono
    };

    Ok(Signal::new(samples, SAMPLE_RATE))
}

/// Write a signal to a mono WAV file
pub fn write_wav(signal: &Signal, path: &Path, encoding: WavEncoding) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: signal.sample_rate(),
        bits_per_sample: match encoding {
            WavEncoding::Int16 => 16,
            WavEncoding::Float32 => 32,
        },
        sample_format: match encoding {
            WavEncoding::Int16 => SampleFormat::Int,
            WavEncoding::Float32 => SampleFormat::Float,
        },
    };

    let mut writer = WavWriter::create(path, spec).map_err(hound_to_io)?;

    match encoding {
        WavEncoding::Int16 => {
            for &sample in signal.samples() {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(hound_to_io)?;
            }
        }
        WavEncoding::Float32 => {
            for &sample in signal.samples() {
                writer.write_sample(sample).map_err(hound_to_io)?;
            }
        }
    }

    writer.finalize().map_err(hound_to_io)?;
    Ok(())
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn hound_to_io(e: hound::Error) -> MaqamError {
    match e {
        hound::Error::IoError(io) => MaqamError::Io(io),
        other => MaqamError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let decode_err = |bits: &str, e: hound::Error| MaqamError::Decode {
        reason: format!("Failed to read {} samples: {}", bits, e),
        source: Some(Box::new(e)),
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| decode_err("float", e)),
        SampleFormat::Int => match bits_per_sample {
            // hound hands 8-bit unsigned PCM back as signed
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_err("8-bit", e)),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_err("16-bit", e)),
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_err("24-bit", e)),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_err("32-bit int", e)),
            _ => Err(MaqamError::decode(format!(
                "unsupported {}-bit integer audio",
                bits_per_sample
            ))),
        },
    }
}

/// Average interleaved frames down to one channel. A trailing partial frame
/// is dropped.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Convert `samples` from `from_rate` to `to_rate`
///
/// Output holds `ceil(len * to_rate / from_rate)` samples, aligned with the
/// input (the interpolator's delay is trimmed off).
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let target_len = (samples.len() as f64 * ratio).ceil() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1).map_err(resample_error)?;
    let delay = resampler.output_delay();

    let mut output = resampler
        .process(&[samples], None)
        .map_err(resample_error)?
        .into_iter()
        .next()
        .unwrap_or_default();

    // Flush the tail still held in the interpolator
    while output.len() < delay + target_len {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(resample_error)?
            .into_iter()
            .next()
            .unwrap_or_default();
        if tail.is_empty() {
            break;
        }
        output.extend(tail);
    }

    let mut aligned: Vec<f32> = output.into_iter().skip(delay).take(target_len).collect();
    aligned.resize(target_len, 0.0);
    Ok(aligned)
}

fn resample_error(e: impl std::error::Error + Send + Sync + 'static) -> MaqamError {
    MaqamError::Decode {
        reason: format!("Failed to resample: {}", e),
        source: Some(Box::new(e)),
    }
}

// ============================================================================
// Tests
// ============================================================================
