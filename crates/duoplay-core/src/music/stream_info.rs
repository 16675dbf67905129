//! Per-file playback state for the music player
//!
//! Grounded on Kodi's `CFileStream` (PAPlayer.h): every queued file carries
//! its own decoder(s), sink(s), and the frame-counter markers that drive
//! the scheduling tick in `player.rs`.

use crate::decoder::AudioDecoder;
use crate::sink::AudioSink;
use crate::types::AudioFormat;

/// Album/disc/track identity used only to decide gapless suppression
/// between two consecutively queued files (S3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumKey {
    pub album: String,
    pub disc: u32,
    pub track: u32,
}

impl AlbumKey {
    /// True if `next` is the track immediately following `self` on the
    /// same disc of the same album.
    pub fn is_gapless_successor(&self, next: &AlbumKey) -> bool {
        self.album == next.album && self.disc == next.disc && next.track == self.track + 1
    }
}

/// One queued or playing file and everything the scheduler needs to know
/// about it.
pub struct StreamInfo {
    pub primary_decoder: Box<dyn AudioDecoder>,
    /// `None` when the primary decoder is reused for the secondary sink
    /// (`IsReusableForAudio2`) rather than a dedicated second decode pass.
    pub secondary_decoder: Option<Box<dyn AudioDecoder>>,
    pub primary_sink: Box<dyn AudioSink>,
    pub secondary_sink: Option<Box<dyn AudioSink>>,
    pub primary_format: AudioFormat,
    pub secondary_format: Option<AudioFormat>,

    pub frames_sent: i64,
    pub frames_sent2: i64,
    pub volume: f32,

    /// Frame count (on this stream's own primary sink) at which the
    /// player should fire `OnQueueNextItem` to ask the caller to queue
    /// the following file.
    pub prepare_next_at_frame: i64,
    /// Frame count at which the scheduler starts the next stream (and,
    /// if crossfading, begins fading this one out). `i64::MAX` until set.
    pub play_next_at_frame: i64,
    pub seek_frame: Option<i64>,

    pub started: bool,
    pub play_next_triggered: bool,
    pub prepare_triggered: bool,
    pub fade_out_triggered: bool,
    pub is_slaved: bool,
    pub finishing: bool,

    /// Bytes to silently discard from the next `QueueData2` call, credited
    /// by `SyncStreams2` when the secondary sink is found running ahead.
    pub discard_samples: i64,

    pub album_key: Option<AlbumKey>,
    pub total_frames: i64,

    /// Resume position in ms, applied by `ProcessStream`'s first-play
    /// handling the moment this stream actually starts. A seek requested
    /// before that first call is discarded in favor of this offset (S5).
    pub start_offset_ms: i64,
    /// `1.0` is normal playback; any other value is FF/RW, adjusting
    /// `frames_sent` every tick and scheduling a periodic re-seek.
    pub speed: f64,
    pub next_reseek_at: Option<std::time::Instant>,
}

impl StreamInfo {
    pub fn new(
        primary_decoder: Box<dyn AudioDecoder>,
        primary_sink: Box<dyn AudioSink>,
        primary_format: AudioFormat,
        secondary: Option<(Option<Box<dyn AudioDecoder>>, Box<dyn AudioSink>, AudioFormat)>,
        album_key: Option<AlbumKey>,
        total_frames: i64,
        start_offset_ms: i64,
    ) -> Self {
        let (secondary_decoder, secondary_sink, secondary_format) = match secondary {
            Some((dec, sink, fmt)) => (dec, Some(sink), Some(fmt)),
            None => (None, None, None),
        };

        Self {
            primary_decoder,
            secondary_decoder,
            primary_sink,
            secondary_sink,
            primary_format,
            secondary_format,
            frames_sent: 0,
            frames_sent2: 0,
            volume: 1.0,
            prepare_next_at_frame: i64::MAX,
            play_next_at_frame: i64::MAX,
            seek_frame: None,
            started: false,
            play_next_triggered: false,
            prepare_triggered: false,
            fade_out_triggered: false,
            is_slaved: false,
            finishing: false,
            discard_samples: 0,
            album_key,
            total_frames,
            start_offset_ms,
            speed: 1.0,
            next_reseek_at: None,
        }
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary_sink.is_some()
    }

    /// True when a single decoder instance is feeding both sinks (shared
    /// input position, vs. a dedicated second decode pass).
    pub fn shares_decoder(&self) -> bool {
        self.has_secondary() && self.secondary_decoder.is_none()
    }

    pub fn bytes_per_frame(&self) -> u32 {
        self.primary_format.bytes_per_frame()
    }

    /// Apply `volume` to both sinks atomically from the caller's
    /// perspective (5. Concurrency: "not serialized against in-flight
    /// audio", so this is just two independent calls).
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.primary_sink.set_volume(volume);
        if let Some(sink) = self.secondary_sink.as_mut() {
            sink.set_volume(volume);
        }
    }

    pub fn fade_both(&mut self, from: f32, to: f32, duration_ms: u32) {
        self.primary_sink.fade_volume(from, to, duration_ms);
        if let Some(sink) = self.secondary_sink.as_mut() {
            sink.fade_volume(from, to, duration_ms);
        }
    }

    pub fn is_fading(&self) -> bool {
        self.primary_sink.is_fading()
            || self.secondary_sink.as_ref().map(|s| s.is_fading()).unwrap_or(false)
    }

    pub fn drain_both(&mut self) {
        self.primary_sink.drain();
        if let Some(sink) = self.secondary_sink.as_mut() {
            sink.drain();
        }
    }

    pub fn is_drained(&self) -> bool {
        self.primary_sink.is_drained()
    }

    pub fn is_buffering(&self) -> bool {
        self.primary_sink.is_buffering()
            || self.secondary_sink.as_ref().map(|s| s.is_buffering()).unwrap_or(false)
    }

    pub fn pause_both(&mut self) {
        self.primary_sink.pause();
        if let Some(sink) = self.secondary_sink.as_mut() {
            sink.pause();
        }
    }

    pub fn resume_both(&mut self) {
        self.primary_sink.resume();
        if let Some(sink) = self.secondary_sink.as_mut() {
            sink.resume();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gapless_successor_requires_same_album_and_disc() {
        let a = AlbumKey { album: "Remain in Light".into(), disc: 1, track: 3 };
        let b = AlbumKey { album: "Remain in Light".into(), disc: 1, track: 4 };
        let c = AlbumKey { album: "Remain in Light".into(), disc: 2, track: 1 };
        assert!(a.is_gapless_successor(&b));
        assert!(!a.is_gapless_successor(&c));
    }
}
