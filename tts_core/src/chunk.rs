//! Splitting a PCM buffer into a start / chunk* / stop frame sequence.

use std::iter;

/// Sample rate, bytes per sample and channel count of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub rate: u32,
    pub width: u16,
    pub channels: u16,
}

impl AudioFormat {
    /// 24 kHz, 16-bit, mono.
    pub const SPEECH_24K: AudioFormat = AudioFormat {
        rate: 24_000,
        width: 2,
        channels: 1,
    };

    pub fn bytes_per_sample_frame(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Bytes covering `frame_ms` milliseconds of audio.
    ///
    /// Rounded down to a whole sample frame and never less than one, so a
    /// chunk never splits a sample.
    pub fn chunk_size(&self, frame_ms: u32) -> usize {
        let align = self.bytes_per_sample_frame().max(1);
        let raw = self.rate as u64 * align as u64 * frame_ms as u64 / 1000;
        let raw = raw as usize;
        (raw - raw % align).max(align)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::SPEECH_24K
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFrame {
    Start(AudioFormat),
    Chunk { format: AudioFormat, audio: Vec<u8> },
    Stop,
}

/// Frame sequence for one utterance: exactly one `Start`, one `Chunk` per
/// `frame_ms` slice of `pcm` (the last may be shorter), exactly one `Stop`.
///
/// An empty buffer still yields `Start` followed by `Stop`.
pub fn frame_sequence(
    pcm: &[u8],
    format: AudioFormat,
    frame_ms: u32,
) -> impl Iterator<Item = AudioFrame> + '_ {
    let chunk_size = format.chunk_size(frame_ms);
    iter::once(AudioFrame::Start(format))
        .chain(pcm.chunks(chunk_size).map(move |slice| AudioFrame::Chunk {
            format,
            audio: slice.to_vec(),
        }))
        .chain(iter::once(AudioFrame::Stop))
}
