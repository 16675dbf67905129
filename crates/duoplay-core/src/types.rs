//! Common audio types for duoplay-core
//!
//! Fundamental PCM buffer and format types shared across the decode,
//! sync, and sink layers.

use std::ops::{Index, IndexMut};

/// Ticks per second used for every timestamp and duration in this crate.
///
/// Matches Kodi's `DVD_TIME_BASE`: all `pts`/`duration`/clock values are
/// expressed as integer microsecond ticks rather than floating seconds so
/// that sync arithmetic never accumulates rounding error.
pub const DVD_TIME_BASE: i64 = 1_000_000;

/// Sentinel for "no presentation timestamp available".
pub const DVD_NOPTS_VALUE: i64 = i64::MIN;

#[inline]
pub fn ms_to_ticks(ms: f64) -> i64 {
    (ms * (DVD_TIME_BASE as f64) / 1000.0) as i64
}

#[inline]
pub fn ticks_to_ms(ticks: i64) -> f64 {
    ticks as f64 * 1000.0 / DVD_TIME_BASE as f64
}

/// Audio sample type used for PCM processing.
pub type Sample = f32;

/// Compressed codec identifiers relevant to passthrough decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Pcm,
    Ac3,
    EAc3,
    Dts,
    DtsHd,
    TrueHd,
    Flac,
    Aac,
    Vorbis,
    Opus,
    Other,
}

/// Channel layout, bitmask-style: one bit per speaker position.
/// Only the count is load-bearing for this crate's sync/mix logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout(pub u32);

impl ChannelLayout {
    pub const STEREO: ChannelLayout = ChannelLayout(0b11);

    pub fn channel_count(&self) -> u32 {
        self.0.count_ones()
    }
}

/// Sample storage format as negotiated with a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    Float32,
    Signed16,
    Signed32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> u32 {
        match self {
            SampleFormat::Float32 => 4,
            SampleFormat::Signed16 => 2,
            SampleFormat::Signed32 => 4,
        }
    }
}

/// Full description of a PCM or passthrough stream's shape.
///
/// Two frames are "format-compatible" iff every field matches (see
/// [`AudioFormat::compatible`]).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    /// Sample rate as declared by the container/codec, prior to any
    /// device-side resampling. Differs from `sample_rate` only when the
    /// sink had to fall back to a rate the device actually supports.
    pub encoded_sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub sample_format: SampleFormat,
    pub is_passthrough: bool,
    pub codec_id: CodecId,
}

impl AudioFormat {
    pub fn compatible(&self, other: &AudioFormat) -> bool {
        self == other
    }

    pub fn bytes_per_frame(&self) -> u32 {
        self.sample_format.bytes_per_sample() * self.channel_layout.channel_count()
    }
}

/// An owned PCM-or-encoded payload plus timing metadata.
///
/// Frames are consumed exactly once: ownership of `data` transfers into
/// the renderer the moment `AddPackets` accepts it (see [`crate::sink::AudioSink`]).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub data: Vec<u8>,
    /// Presentation timestamp in `DVD_TIME_BASE` ticks, or
    /// [`DVD_NOPTS_VALUE`] if the codec produced no timing for this frame.
    pub pts: i64,
    /// Duration of this frame in ticks, derived from the codec's decoded
    /// sample count and `encoded_sample_rate`.
    pub duration: i64,
    pub encoded_sample_rate: u32,
    pub passthrough: bool,
}

impl AudioFrame {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn has_pts(&self) -> bool {
        self.pts != DVD_NOPTS_VALUE
    }

    /// A zero-length frame with no timing, used as a benign placeholder
    /// when a secondary decoder produced nothing for this iteration.
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            pts: DVD_NOPTS_VALUE,
            duration: 0,
            encoded_sample_rate: 0,
            passthrough: false,
        }
    }

    /// Overwrite the payload with zeros in place, keeping timing intact.
    /// Used by the dual-sink aligner to stuff silence into a lagging sink
    /// without disturbing its delay bookkeeping.
    pub fn silence_in_place(&mut self) {
        self.data.iter_mut().for_each(|b| *b = 0);
    }
}

/// A single stereo sample (left and right channels), `repr(C)` so it can
/// be reinterpreted as interleaved `f32` via `bytemuck` with no copy.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        Self { left: self.left + other.left, right: self.right + other.right }
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;
    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self { left: self.left * factor, right: self.right * factor }
    }
}

/// A buffer of interleaved stereo samples used by sink backends and
/// crossfade mixing.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    pub fn silence(len: usize) -> Self {
        Self { samples: vec![StereoSample::silence(); len] }
    }

    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        assert!(interleaved.len() % 2 == 0, "interleaved buffer must have even length");
        let samples = interleaved
            .chunks_exact(2)
            .map(|c| StereoSample::new(c[0], c[1]))
            .collect();
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    pub fn scale(&mut self, factor: Sample) {
        for s in &mut self.samples {
            *s = *s * factor;
        }
    }

    /// Mix `other` into `self` scaled by `gain`, used by the crossfade
    /// envelope to blend outgoing/incoming streams sample-for-sample.
    pub fn mix_in(&mut self, other: &StereoBuffer, gain: Sample) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst = *dst + (*src * gain);
        }
    }

    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;
    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// Which of the two process-wide engine slots a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineSlot {
    Primary,
    Secondary,
}

impl EngineSlot {
    pub fn index(&self) -> usize {
        match self {
            EngineSlot::Primary => 0,
            EngineSlot::Secondary => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_sample_arithmetic() {
        let a = StereoSample::new(1.0, 2.0);
        let b = StereoSample::new(0.5, 0.5);
        let sum = a + b;
        assert_eq!(sum.left, 1.5);
        assert_eq!(sum.right, 2.5);
        assert_eq!((a * 0.5).left, 0.5);
    }

    #[test]
    fn stereo_buffer_from_interleaved() {
        let buf = StereoBuffer::from_interleaved(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf[0].left, 1.0);
        assert_eq!(buf[1].right, 4.0);
    }

    #[test]
    fn ticks_roundtrip() {
        assert_eq!(ms_to_ticks(100.0), 100_000);
        assert!((ticks_to_ms(100_000) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn format_compatible_requires_all_fields() {
        let a = AudioFormat {
            sample_rate: 48000,
            encoded_sample_rate: 48000,
            channel_layout: ChannelLayout::STEREO,
            sample_format: SampleFormat::Float32,
            is_passthrough: false,
            codec_id: CodecId::Flac,
        };
        let mut b = a.clone();
        assert!(a.compatible(&b));
        b.sample_rate = 44100;
        assert!(!a.compatible(&b));
    }
}
