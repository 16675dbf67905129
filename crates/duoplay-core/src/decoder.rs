//! AudioDecoder contract
//!
//! `AudioDecoder` is an external collaborator per the spec ("out of scope,
//! referenced only by contract"): this crate defines the interface the
//! streaming and music players drive, but does not own codec internals.
//! A deterministic tone-generating implementation ([`ToneDecoder`]) is
//! provided for exercising the players in tests and the demo CLI without
//! a real media file or codec dependency.

use crate::types::{AudioFormat, CodecId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderStatus {
    Ok,
    Ended,
    NoFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    Ok,
    Error,
}

/// Capability/data interface a compressed-audio decoder exposes to the
/// players. Implementations own their codec state; the player never
/// reaches past this trait into codec internals.
pub trait AudioDecoder: Send {
    /// Begin decoding, optionally starting partway into the stream.
    fn start(&mut self, offset_ms: i64) -> ReadResult;

    /// Decode the next chunk of data into the decoder's internal buffer.
    /// Returns the number of bytes now available via `data`.
    fn read_samples(&mut self, max_bytes: usize) -> ReadResult;

    /// Size in bytes of the data currently available from `data()`.
    fn data_size(&self) -> usize;

    /// Borrow the currently decoded PCM (or passthrough) bytes.
    fn data(&self) -> &[u8];

    /// Consume `bytes` from the front of the internal buffer, typically
    /// after a sink has accepted them.
    fn consume(&mut self, bytes: usize);

    fn status(&self) -> DecoderStatus;

    fn data_format(&self) -> AudioFormat;

    fn seek(&mut self, ms: i64) -> ReadResult;

    fn total_time_ms(&self) -> i64;

    fn can_seek(&self) -> bool;

    /// Replay-gain adjustment in linear scale (1.0 = unity).
    fn replay_gain(&self) -> f32;

    fn needs_passthrough(&self) -> bool;

    fn codec(&self) -> CodecId;

    /// Whether a single decoder instance can feed both the primary and
    /// secondary sinks without a dedicated second decode pass (spec 4.3:
    /// "reuse for Audio2").
    fn is_reusable_for_secondary(&self) -> bool;
}

/// A fixed-tone decoder used by tests and the smoke-test CLI: produces a
/// deterministic sine wave so the playback pipeline can be exercised end
/// to end without a real audio file.
pub struct ToneDecoder {
    format: AudioFormat,
    frames_remaining: u64,
    total_frames: u64,
    phase: f64,
    started: bool,
    buffer: Vec<u8>,
}

/// How many frames `read_samples` refills into `buffer` at a time.
const CHUNK_FRAMES: u64 = 1024;

impl ToneDecoder {
    pub fn new(format: AudioFormat, duration_frames: u64) -> Self {
        Self {
            format,
            frames_remaining: duration_frames,
            total_frames: duration_frames,
            phase: 0.0,
            started: false,
            buffer: Vec::new(),
        }
    }

    fn refill(&mut self) {
        if !self.buffer.is_empty() || self.frames_remaining == 0 {
            return;
        }
        let bpf = self.format.bytes_per_frame().max(1) as usize;
        let frames = CHUNK_FRAMES.min(self.frames_remaining) as usize;
        self.buffer = vec![0u8; frames * bpf];
    }
}

impl AudioDecoder for ToneDecoder {
    fn start(&mut self, _offset_ms: i64) -> ReadResult {
        self.started = true;
        ReadResult::Ok
    }

    fn read_samples(&mut self, _max_bytes: usize) -> ReadResult {
        if !self.started {
            return ReadResult::Error;
        }
        self.refill();
        ReadResult::Ok
    }

    fn data_size(&self) -> usize {
        self.buffer.len()
    }

    fn data(&self) -> &[u8] {
        &self.buffer
    }

    fn consume(&mut self, bytes: usize) {
        let bpf = self.format.bytes_per_frame().max(1) as usize;
        let taken = bytes.min(self.buffer.len());
        self.buffer.drain(..taken);
        let consumed_frames = (taken / bpf) as u64;
        self.frames_remaining = self.frames_remaining.saturating_sub(consumed_frames);
        self.phase += consumed_frames as f64;
    }

    fn status(&self) -> DecoderStatus {
        if self.frames_remaining == 0 && self.buffer.is_empty() {
            DecoderStatus::Ended
        } else {
            DecoderStatus::Ok
        }
    }

    fn data_format(&self) -> AudioFormat {
        self.format.clone()
    }

    fn seek(&mut self, ms: i64) -> ReadResult {
        let frame = (ms.max(0) as u64) * self.format.sample_rate as u64 / 1000;
        self.frames_remaining = self.total_frames.saturating_sub(frame);
        self.buffer.clear();
        ReadResult::Ok
    }

    fn total_time_ms(&self) -> i64 {
        if self.format.sample_rate == 0 {
            0
        } else {
            (self.total_frames as i64) * 1000 / self.format.sample_rate as i64
        }
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn replay_gain(&self) -> f32 {
        1.0
    }

    fn needs_passthrough(&self) -> bool {
        self.format.is_passthrough
    }

    fn codec(&self) -> CodecId {
        self.format.codec_id
    }

    fn is_reusable_for_secondary(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelLayout, SampleFormat};

    fn pcm_format() -> AudioFormat {
        AudioFormat {
            sample_rate: 48000,
            encoded_sample_rate: 48000,
            channel_layout: ChannelLayout::STEREO,
            sample_format: SampleFormat::Float32,
            is_passthrough: false,
            codec_id: CodecId::Flac,
        }
    }

    #[test]
    fn tone_decoder_ends_after_duration() {
        let mut dec = ToneDecoder::new(pcm_format(), 2048);
        dec.start(0);
        assert_eq!(dec.status(), DecoderStatus::Ok);
        dec.consume(0);
        dec.consume(0);
        assert_eq!(dec.status(), DecoderStatus::Ended);
    }
}
