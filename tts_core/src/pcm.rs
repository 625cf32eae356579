//! Float waveform -> 16-bit little-endian PCM.

use ndarray::ArrayD;

/// Output volume multiplier used when none is configured.
pub const DEFAULT_GAIN: f32 = 3.0;

const I16_MAX_F32: f32 = i16::MAX as f32;

/// Apply `gain`, clamp to [-1.0, 1.0] and quantize one sample.
///
/// NaN quantizes to silence.
#[inline]
pub fn quantize_sample(sample: f32, gain: f32) -> i16 {
    let v = (sample * gain).clamp(-1.0, 1.0);
    (v * I16_MAX_F32).round() as i16
}

/// Convert a model waveform of any shape into PCM bytes.
///
/// Samples are read in logical order, so batch or singleton axes collapse
/// and a 0-d result becomes a single sample.
pub fn postprocess(samples: &ArrayD<f32>, gain: f32) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples.iter() {
        out.extend_from_slice(&quantize_sample(s, gain).to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, Array2, ArrayD, IxDyn};

    fn as_i16(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_clamp_upper_bound() {
        assert_eq!(quantize_sample(2.0, 1.0), i16::MAX);
        assert_eq!(quantize_sample(0.5, 3.0), i16::MAX);
    }

    #[test]
    fn test_clamp_lower_bound() {
        // -1.0 * 32767 never reaches i16::MIN
        assert_eq!(quantize_sample(-5.0, 1.0), -32767);
    }

    #[test]
    fn test_rounds_to_nearest() {
        assert_eq!(quantize_sample(0.6 / I16_MAX_F32, 1.0), 1);
        assert_eq!(quantize_sample(0.4 / I16_MAX_F32, 1.0), 0);
        assert_eq!(quantize_sample(-0.6 / I16_MAX_F32, 1.0), -1);
    }

    #[test]
    fn test_nan_is_silence() {
        assert_eq!(quantize_sample(f32::NAN, 3.0), 0);
    }

    #[test]
    fn test_gain_applied_before_clamp() {
        let w = ArrayD::from_shape_vec(IxDyn(&[3]), vec![0.1, -0.1, 0.0]).unwrap();
        let pcm = as_i16(&postprocess(&w, 3.0));
        assert_eq!(pcm, vec![9830, -9830, 0]);
    }

    #[test]
    fn test_batch_dimension_collapses() {
        let w = Array2::from_shape_vec((1, 4), vec![0.0, 0.25, 0.5, 1.0])
            .unwrap()
            .into_dyn();
        let pcm = postprocess(&w, 1.0);
        assert_eq!(pcm.len(), 8);
        assert_eq!(as_i16(&pcm), vec![0, 8192, 16384, 32767]);
    }

    #[test]
    fn test_scalar_becomes_single_sample() {
        let w = arr0(1.0f32).into_dyn();
        let pcm = postprocess(&w, 1.0);
        assert_eq!(as_i16(&pcm), vec![32767]);
    }

    #[test]
    fn test_little_endian_layout() {
        let w = ArrayD::from_shape_vec(IxDyn(&[1]), vec![1.0]).unwrap();
        assert_eq!(postprocess(&w, 1.0), vec![0xff, 0x7f]);
    }

    #[test]
    fn test_deterministic() {
        let samples: Vec<f32> = (0..1000).map(|i| ((i as f32) * 0.013).sin() * 0.4).collect();
        let w = ArrayD::from_shape_vec(IxDyn(&[samples.len()]), samples).unwrap();
        assert_eq!(postprocess(&w, DEFAULT_GAIN), postprocess(&w, DEFAULT_GAIN));
    }

    #[test]
    fn test_empty_waveform() {
        let w = ArrayD::<f32>::zeros(IxDyn(&[0]));
        assert!(postprocess(&w, DEFAULT_GAIN).is_empty());
    }
}
