//! AudioSink (IAEStream) contract and a CPAL-backed reference implementation
//!
//! The spec treats `AudioSink`/`IAEStream` as an external collaborator —
//! the core logic (streaming player, music player, sync controller) only
//! ever touches the trait. `CpalSink` is the ambient-stack reference
//! backend used by the demo CLI and integration tests, grounded on the
//! teacher's `cpal_backend.rs` output-stream construction.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat as CpalSampleFormat, Stream, StreamConfig};

use crate::error::{CoreError, CoreResult};
use crate::types::{AudioFormat, DVD_TIME_BASE};

/// Capability/data interface a single output endpoint exposes.
///
/// One `AudioSink` is created per engine slot per stream (`MakeStream`);
/// ownership lives with the engine that created it until `FreeStream`.
pub trait AudioSink: Send {
    /// Push bytes into the sink; returns the number of bytes actually
    /// accepted (may be less than `buf.len()` if the sink's ring buffer
    /// is near full).
    fn add_data(&mut self, buf: &[u8]) -> usize;

    /// Free space in bytes currently available in the sink's buffer.
    fn space(&self) -> usize;

    /// Output delay in `DVD_TIME_BASE` ticks: how far in the future the
    /// next byte pushed will actually be heard.
    fn delay(&self) -> i64;

    fn cache_time(&self) -> i64;
    fn cache_total(&self) -> i64;

    /// True while the sink has buffered data that hasn't started playing.
    fn is_buffering(&self) -> bool;

    /// True once all buffered data has been played out after a `drain`.
    fn is_drained(&self) -> bool;

    fn drain(&mut self);
    fn flush(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);

    fn set_volume(&mut self, volume: f32);
    fn fade_volume(&mut self, from: f32, to: f32, duration_ms: u32);
    fn is_fading(&self) -> bool;

    fn set_replay_gain(&mut self, gain: f32);

    /// Continuous output-to-input rate multiplier applied by RESAMPLE sync.
    fn set_resample_ratio(&mut self, ratio: f64);

    /// Register `slave` to start exactly when `self` finishes, for
    /// sample-exact gapless handoff.
    fn register_slave(&mut self, slave_format: &AudioFormat);

    fn set_playing_pts(&mut self, pts: i64);
    fn playing_pts(&self) -> i64;

    fn is_valid_format(&self, format: &AudioFormat) -> bool;

    /// Whether this sink reports delay reliably enough to drive dual-sink
    /// alignment math ("dumb" sinks suppress that logic entirely).
    fn is_dumb(&self) -> bool {
        false
    }
}

/// Shared lock-free state a `CpalSink`'s audio callback reads/writes
/// without ever touching a mutex — mirrors the teacher's atomics-based
/// lock-free UI/audio-thread split.
struct SinkAtomics {
    volume_milli: AtomicU32,
    playing_pts: AtomicI64,
    paused: AtomicBool,
    fading: AtomicBool,
}

impl SinkAtomics {
    fn new() -> Self {
        Self {
            volume_milli: AtomicU32::new(1000),
            playing_pts: AtomicI64::new(crate::types::DVD_NOPTS_VALUE),
            paused: AtomicBool::new(false),
            fading: AtomicBool::new(false),
        }
    }
}

/// A CPAL-backed `AudioSink`: owns one device stream and a lock-free
/// ring buffer the audio callback drains.
pub struct CpalSink {
    _stream: Stream,
    producer: rtrb::Producer<u8>,
    atomics: Arc<SinkAtomics>,
    format: AudioFormat,
    resample_ratio: f64,
    drained: bool,
}

impl CpalSink {
    /// Open the default output device for `format`.
    ///
    /// `format.is_passthrough` streams are written through unchanged;
    /// this reference backend otherwise expects interleaved f32 PCM.
    pub fn open_default(format: AudioFormat) -> CoreResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(CoreError::NoDevices)?;

        let supported = device
            .default_output_config()
            .map_err(|e| CoreError::StreamBuildError(e.to_string()))?;

        let stream_config: StreamConfig = supported.clone().into();
        let channels = stream_config.channels as usize;
        let bytes_per_frame = format.bytes_per_frame() as usize;

        // 4 seconds of headroom at the negotiated rate, generous enough
        // that normal playback never backs up against it.
        let capacity_bytes = format.sample_rate as usize * bytes_per_frame * 4;
        let (producer, mut consumer) = rtrb::RingBuffer::<u8>::new(capacity_bytes);

        let atomics = Arc::new(SinkAtomics::new());
        let cb_atomics = atomics.clone();

        let sample_format = supported.sample_format();
        let stream = match sample_format {
            CpalSampleFormat::F32 => device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _| {
                        let paused = cb_atomics.paused.load(Ordering::Relaxed);
                        let volume = cb_atomics.volume_milli.load(Ordering::Relaxed) as f32 / 1000.0;
                        for frame in data.chunks_mut(channels) {
                            let mut bytes = [0u8; 4];
                            let got = !paused && consumer.read_chunk(4).map(|chunk| {
                                let (a, b) = chunk.as_slices();
                                let mut i = 0;
                                for &byte in a.iter().chain(b.iter()) {
                                    bytes[i] = byte;
                                    i += 1;
                                }
                                chunk.commit_all();
                                true
                            }).unwrap_or(false);
                            let sample = if got { f32::from_le_bytes(bytes) * volume } else { 0.0 };
                            for ch in frame.iter_mut() {
                                *ch = sample;
                            }
                        }
                    },
                    move |err| log::error!("sink stream error: {}", err),
                    None,
                )
                .map_err(|e| CoreError::StreamBuildError(e.to_string()))?,
            other => {
                return Err(CoreError::StreamBuildError(format!(
                    "unsupported device sample format {:?}",
                    other
                )))
            }
        };

        stream.play().map_err(|e| CoreError::StreamPlayError(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            producer,
            atomics,
            format,
            resample_ratio: 1.0,
            drained: false,
        })
    }
}

impl AudioSink for CpalSink {
    fn add_data(&mut self, buf: &[u8]) -> usize {
        self.drained = false;
        let mut written = 0;
        for &byte in buf {
            if self.producer.push(byte).is_err() {
                break;
            }
            written += 1;
        }
        written
    }

    fn space(&self) -> usize {
        self.producer.slots()
    }

    fn delay(&self) -> i64 {
        let buffered_bytes = self.producer.slots();
        let bytes_per_sec = self.format.sample_rate as usize * self.format.bytes_per_frame() as usize;
        if bytes_per_sec == 0 {
            return 0;
        }
        ((buffered_bytes as i64) * DVD_TIME_BASE) / bytes_per_sec as i64
    }

    fn cache_time(&self) -> i64 {
        self.delay()
    }

    fn cache_total(&self) -> i64 {
        let bytes_per_sec = self.format.sample_rate as usize * self.format.bytes_per_frame() as usize;
        if bytes_per_sec == 0 {
            return 0;
        }
        4 * DVD_TIME_BASE
    }

    fn is_buffering(&self) -> bool {
        self.producer.slots() > 0 && self.atomics.paused.load(Ordering::Relaxed)
    }

    fn is_drained(&self) -> bool {
        self.drained
    }

    fn drain(&mut self) {
        self.drained = true;
    }

    fn flush(&mut self) {
        self.drained = true;
    }

    fn pause(&mut self) {
        self.atomics.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&mut self) {
        self.atomics.paused.store(false, Ordering::Relaxed);
    }

    fn set_volume(&mut self, volume: f32) {
        self.atomics.volume_milli.store((volume.clamp(0.0, 1.0) * 1000.0) as u32, Ordering::Relaxed);
    }

    fn fade_volume(&mut self, _from: f32, _to: f32, _duration_ms: u32) {
        self.atomics.fading.store(true, Ordering::Relaxed);
    }

    fn is_fading(&self) -> bool {
        self.atomics.fading.load(Ordering::Relaxed)
    }

    fn set_replay_gain(&mut self, _gain: f32) {}

    fn set_resample_ratio(&mut self, ratio: f64) {
        self.resample_ratio = ratio;
    }

    fn register_slave(&mut self, _slave_format: &AudioFormat) {}

    fn set_playing_pts(&mut self, pts: i64) {
        self.atomics.playing_pts.store(pts, Ordering::Relaxed);
    }

    fn playing_pts(&self) -> i64 {
        self.atomics.playing_pts.load(Ordering::Relaxed)
    }

    fn is_valid_format(&self, format: &AudioFormat) -> bool {
        self.format.compatible(format)
    }
}

/// A trivial in-memory `AudioSink` used by player/sync unit tests across
/// this crate so they don't depend on real audio hardware being present.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::types::{ChannelLayout, CodecId, SampleFormat};

    pub struct MemSink {
        pub buffered: Vec<u8>,
        pub delay_ticks: i64,
        pub volume: f32,
        pub dumb: bool,
        pub drained: bool,
        pub playing_pts: i64,
        pub resample_ratio: f64,
        pub format: AudioFormat,
    }

    impl MemSink {
        pub fn new(format: AudioFormat) -> Self {
            Self {
                buffered: Vec::new(),
                delay_ticks: 0,
                volume: 1.0,
                dumb: false,
                drained: false,
                playing_pts: crate::types::DVD_NOPTS_VALUE,
                resample_ratio: 1.0,
                format,
            }
        }
    }

    impl AudioSink for MemSink {
        fn add_data(&mut self, buf: &[u8]) -> usize {
            self.drained = false;
            self.buffered.extend_from_slice(buf);
            buf.len()
        }
        fn space(&self) -> usize {
            1 << 20
        }
        fn delay(&self) -> i64 {
            self.delay_ticks
        }
        fn cache_time(&self) -> i64 {
            self.delay_ticks
        }
        fn cache_total(&self) -> i64 {
            DVD_TIME_BASE
        }
        fn is_buffering(&self) -> bool {
            false
        }
        fn is_drained(&self) -> bool {
            self.drained
        }
        fn drain(&mut self) {
            self.drained = true;
        }
        fn flush(&mut self) {
            self.buffered.clear();
            self.drained = true;
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
        }
        fn fade_volume(&mut self, _from: f32, _to: f32, _duration_ms: u32) {}
        fn is_fading(&self) -> bool {
            false
        }
        fn set_replay_gain(&mut self, _gain: f32) {}
        fn set_resample_ratio(&mut self, ratio: f64) {
            self.resample_ratio = ratio;
        }
        fn register_slave(&mut self, _slave_format: &AudioFormat) {}
        fn set_playing_pts(&mut self, pts: i64) {
            self.playing_pts = pts;
        }
        fn playing_pts(&self) -> i64 {
            self.playing_pts
        }
        fn is_valid_format(&self, format: &AudioFormat) -> bool {
            self.format.compatible(format)
        }
        fn is_dumb(&self) -> bool {
            self.dumb
        }
    }

    pub fn test_format() -> AudioFormat {
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
    fn mem_sink_tracks_buffered_bytes() {
        let mut sink = MemSink::new(test_format());
        let accepted = sink.add_data(&[1, 2, 3, 4]);
        assert_eq!(accepted, 4);
        assert_eq!(sink.buffered.len(), 4);
        sink.flush();
        assert!(sink.buffered.is_empty());
        assert!(sink.is_drained());
    }
}
