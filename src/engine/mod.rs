//! Audio Engine Module
//!
//! Signal loading and the immutable mono `Signal` type:
//! - Signal buffer at the fixed pipeline sample rate
//! - WAV decoding, downmixing and resampling

pub mod buffer;
pub mod io;

pub use buffer::{Signal, SAMPLE_RATE};
pub use io::{load_signal, load_signal_from_reader, write_wav, WavEncoding};
