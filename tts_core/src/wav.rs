//! WAV decoding for model output and voice reference inspection.

use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use hound::{SampleFormat, WavReader};
use ndarray::Array2;

use crate::Waveform;

/// Decode a RIFF/WAV byte buffer into a mono float waveform.
///
/// Integer samples are normalised to [-1.0, 1.0); multi-channel audio is
/// down-mixed by averaging each frame.
pub fn decode_wav(bytes: &[u8]) -> anyhow::Result<Waveform> {
    let reader = WavReader::new(Cursor::new(bytes)).context("model output is not a WAV file")?;
    let spec = reader.spec();

    let mut interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to read float samples")?,
        SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .context("failed to read integer samples")?
        }
    };

    let channels = spec.channels.max(1) as usize;
    if channels == 1 {
        return Ok(Waveform::from_vec(interleaved, spec.sample_rate));
    }

    let frames = interleaved.len() / channels;
    interleaved.truncate(frames * channels);
    let grid = Array2::from_shape_vec((frames, channels), interleaved)
        .context("channel layout does not match sample count")?;
    let mono = grid.mean_axis(ndarray::Axis(1)).unwrap_or_default().to_vec();
    Ok(Waveform::from_vec(mono, spec.sample_rate))
}

/// What the startup log reports about the voice reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f32,
}

/// Read the header of a WAV voice reference without decoding its samples.
pub fn inspect_reference<P: AsRef<Path>>(path: P) -> anyhow::Result<ReferenceInfo> {
    let reader = WavReader::open(path.as_ref())
        .with_context(|| format!("Failed to read voice reference {}", path.as_ref().display()))?;
    let spec = reader.spec();
    // duration() counts sample frames, independent of channel count
    let duration_secs = reader.duration() as f32 / spec.sample_rate.max(1) as f32;
    Ok(ReferenceInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn int_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_int16_mono() {
        let bytes = int_wav(&[0, 16384, -16384, i16::MIN], 1, 24_000);
        let w = decode_wav(&bytes).unwrap();
        assert_eq!(w.sample_rate, 24_000);
        let samples: Vec<f32> = w.samples.iter().copied().collect();
        assert_eq!(samples, vec![0.0, 0.5, -0.5, -1.0]);
    }

    #[test]
    fn test_decode_float() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0.25f32, -0.75, 1.5] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let w = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(w.sample_rate, 22_050);
        // out-of-range values survive decoding; clamping happens later
        assert_eq!(w.samples.iter().copied().collect::<Vec<_>>(), vec![0.25, -0.75, 1.5]);
    }

    #[test]
    fn test_decode_stereo_downmix() {
        let bytes = int_wav(&[16384, 0, -16384, -16384], 2, 24_000);
        let w = decode_wav(&bytes).unwrap();
        assert_eq!(w.len(), 2);
        assert_eq!(w.samples.iter().copied().collect::<Vec<_>>(), vec![0.25, -0.5]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_wav(b"definitely not riff").is_err());
        assert!(decode_wav(&[]).is_err());
    }

    #[test]
    fn test_inspect_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.wav");
        std::fs::write(&path, int_wav(&vec![0; 48_000], 2, 16_000)).unwrap();

        let info = inspect_reference(&path).unwrap();
        assert_eq!(info.sample_rate, 16_000);
        assert_eq!(info.channels, 2);
        assert!((info.duration_secs - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_inspect_missing_reference() {
        let err = inspect_reference("/nonexistent/voice.wav").unwrap_err();
        assert!(err.to_string().contains("voice reference"));
    }
}
