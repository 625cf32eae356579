//! Audio and model plumbing for the voice-cloning TTS server.
//!
//! Nothing in this crate knows about the wire protocol: it turns text into
//! a [`Waveform`] through a [`SpeechModel`], turns the waveform into 16-bit
//! PCM, and slices the PCM into timed frames.

pub mod chunk;
pub mod model;
pub mod pcm;
pub mod wav;

use ndarray::{Array1, ArrayD};

pub use chunk::{frame_sequence, AudioFormat, AudioFrame};
pub use model::{CommandModel, SharedModel, SpeechModel};
pub use pcm::{postprocess, DEFAULT_GAIN};

/// Raw model output for one request.
///
/// The sample buffer keeps whatever shape the model produced (`(N,)`,
/// `(1, N)`, a 0-d scalar, ...); postprocessing flattens it.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: ArrayD<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    /// One-dimensional waveform from a plain sample vector.
    pub fn from_vec(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: Array1::from_vec(samples).into_dyn(),
            sample_rate,
        }
    }

    /// Number of samples once flattened.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.len() as f64 / self.sample_rate as f64 * 1000.0) as u64
    }
}
