//! MusicPlayer: gapless / crossfaded multi-stream file playback
//!
//! Grounded on Kodi's `PAPlayer` (paplayer/PAPlayer.cpp): a single thread
//! owns a list of queued/playing `StreamInfo`s and a `finishing` list of
//! streams still draining after retirement. Every sink-facing step (queue,
//! prime, pump, crossfade) is mirrored across the primary and optional
//! secondary sink.

use std::time::Duration;

use crate::decoder::{AudioDecoder, DecoderStatus, ReadResult};
use crate::error::{CoreError, CoreResult};
use crate::music::stream_info::{AlbumKey, StreamInfo};
use crate::sink::AudioSink;
use crate::types::AudioFormat;

/// Fade duration used by `SoftStart`/`SoftStop`, independent of the
/// configured crossfade.
const FAST_XFADE_TIME_MS: u32 = 80;
/// Crossfade cap applied to a user-triggered skip-to-next.
const SKIP_CROSSFADE_CAP_MS: u32 = 2_000;
/// `SyncStreams2` only runs this often at minimum.
const SYNC_STREAMS2_MIN_INTERVAL: Duration = Duration::from_millis(50);
const SYNC_STREAMS2_THRESHOLD_MS: f64 = 50.0;
/// How far before end-of-track the caller is asked to queue the next file.
const PREPARE_LOOKAHEAD_SECONDS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Normal iteration, nothing of note happened this tick.
    Idle,
    /// The caller should queue another file now (frame threshold crossed).
    RequestNextFile,
    /// A crossfade (or gapless handoff) to the next stream just began.
    AdvancedToNext,
    /// No streams left to play.
    Empty,
}

#[derive(Debug, Clone, Copy)]
pub struct MusicPlayerConfig {
    pub crossfade_ms: u32,
    pub crossfade_album_tracks: bool,
    pub dual_output_enabled: bool,
}

impl Default for MusicPlayerConfig {
    fn default() -> Self {
        Self { crossfade_ms: 0, crossfade_album_tracks: false, dual_output_enabled: false }
    }
}

/// Inputs the caller assembles via the engine factory / decoder layer
/// before handing a new file to `MusicPlayer::queue_next_file`.
pub struct NewStreamInputs {
    pub primary_decoder: Box<dyn AudioDecoder>,
    pub primary_sink: Box<dyn AudioSink>,
    pub primary_format: AudioFormat,
    pub secondary: Option<(Option<Box<dyn AudioDecoder>>, Box<dyn AudioSink>, AudioFormat)>,
    pub album_key: Option<AlbumKey>,
    /// Resume position in ms (e.g. continuing a partially played track).
    /// Applied the moment this stream starts playing; a seek requested
    /// before that point is discarded in favor of this offset (S5).
    pub start_offset_ms: i64,
}

pub struct MusicPlayer {
    streams: Vec<StreamInfo>,
    finishing: Vec<StreamInfo>,
    current: Option<usize>,
    config: MusicPlayerConfig,
    elapsed_since_sync: Duration,
}

impl MusicPlayer {
    pub fn new(config: MusicPlayerConfig) -> Self {
        Self {
            streams: Vec::new(),
            finishing: Vec::new(),
            current: None,
            config,
            elapsed_since_sync: Duration::ZERO,
        }
    }

    pub fn active_count(&self) -> usize {
        self.streams.len()
    }

    pub fn finishing_count(&self) -> usize {
        self.finishing.len()
    }

    /// `QueueNextFile`: waits for the primary decoder to produce data (or
    /// report EOF/error), computes this stream's lookahead markers, primes
    /// both sinks, and — absent a configured crossfade — slave-chains it to
    /// whatever is currently playing for a sample-exact gapless handoff.
    pub fn queue_next_file(&mut self, inputs: NewStreamInputs, sample_rate: u32) -> CoreResult<()> {
        let NewStreamInputs {
            mut primary_decoder,
            primary_sink,
            primary_format,
            secondary,
            album_key,
            start_offset_ms,
        } = inputs;

        if primary_decoder.start(0) == ReadResult::Error {
            return Err(CoreError::DecoderError("failed to start primary decoder".into()));
        }

        let mut spins = 0;
        loop {
            primary_decoder.read_samples(64 * 1024);
            if primary_decoder.data_size() > 0 || primary_decoder.status() != DecoderStatus::Ok {
                break;
            }
            spins += 1;
            if spins > 5_000 {
                return Err(CoreError::DecoderError("primary decoder never produced data".into()));
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        let total_frames = if sample_rate > 0 {
            primary_decoder.total_time_ms() * sample_rate as i64 / 1000
        } else {
            0
        };

        let crossfade_ms = self.effective_crossfade_ms(&album_key);

        let secondary = if self.config.dual_output_enabled { secondary } else { None };
        let mut new_stream = StreamInfo::new(
            primary_decoder,
            primary_sink,
            primary_format,
            secondary,
            album_key,
            total_frames,
            start_offset_ms,
        );

        new_stream.prepare_next_at_frame = (total_frames
            - (PREPARE_LOOKAHEAD_SECONDS * sample_rate as i64)
            - (crossfade_ms as i64 * sample_rate as i64 / 1000))
            .max(0);

        self.prepare_stream(&mut new_stream)?;

        if let Some(cur_idx) = self.current {
            let cur = &mut self.streams[cur_idx];
            let crossfade_frames = crossfade_ms as i64 * sample_rate as i64 / 1000;
            cur.play_next_at_frame = (cur.total_frames - crossfade_frames).max(0);

            if crossfade_ms == 0 {
                new_stream.is_slaved = true;
                cur.primary_sink.register_slave(&new_stream.primary_format);
                if let (Some(cur_sec), Some(fmt)) =
                    (cur.secondary_sink.as_mut(), new_stream.secondary_format.as_ref())
                {
                    cur_sec.register_slave(fmt);
                }
            }
        }

        self.streams.push(new_stream);
        if self.current.is_none() {
            self.current = Some(self.streams.len() - 1);
        }
        Ok(())
    }

    /// Suppresses the configured crossfade to 0 for consecutive same-album
    /// tracks in order (S3), and caps any explicit skip-crossfade.
    fn effective_crossfade_ms(&self, incoming_key: &Option<AlbumKey>) -> u32 {
        if let (Some(cur_idx), Some(incoming)) = (self.current, incoming_key) {
            if let Some(cur_key) = self.streams[cur_idx].album_key.as_ref() {
                if self.config.crossfade_album_tracks && cur_key.is_gapless_successor(incoming) {
                    return 0;
                }
            }
        }
        self.config.crossfade_ms
    }

    /// `PrepareStream`: paused sinks primed by pumping decoder samples
    /// until `IsBuffering` goes false, with volume/replaygain applied.
    fn prepare_stream(&mut self, stream: &mut StreamInfo) -> CoreResult<()> {
        stream.pause_both();
        stream.set_volume(1.0);
        stream.primary_sink.set_replay_gain(stream.primary_decoder.replay_gain());

        let mut spins = 0;
        while stream.is_buffering() {
            queue_data_into(&mut *stream.primary_decoder, &mut *stream.primary_sink);
            if let Some(sink) = stream.secondary_sink.as_mut() {
                if let Some(dec) = stream.secondary_decoder.as_mut() {
                    queue_data_into(&mut **dec, &mut **sink);
                }
            }
            spins += 1;
            if spins > 10_000 {
                break;
            }
        }
        Ok(())
    }

    /// One scheduling tick: reap finished streams, pump *every* active
    /// stream (mirroring `PAPlayer::ProcessStreams`'s loop over
    /// `m_streams`, not just the current one — an outgoing stream mid
    /// crossfade must keep decoding and being retired on its own terms),
    /// and fire the prepare/advance triggers at the current stream's
    /// frame thresholds.
    pub fn tick(&mut self) -> TickOutcome {
        self.reap_finishing();

        if self.streams.is_empty() {
            self.current = None;
            return TickOutcome::Empty;
        }

        let mut outcome = TickOutcome::Idle;
        let mut i = 0;
        while i < self.streams.len() {
            if self.streams[i].play_next_triggered && !self.streams[i].is_fading() {
                self.retire_at(i);
                outcome = TickOutcome::AdvancedToNext;
                continue;
            }

            if !self.process_stream(i) {
                self.retire_at(i);
                outcome = TickOutcome::AdvancedToNext;
                continue;
            }

            self.maybe_sync_streams2(i);

            if self.current == Some(i) {
                // Guarded on `outcome == Idle`, not just `!prepare_triggered`:
                // an earlier stream retiring this same tick already claimed
                // the single `TickOutcome` slot, so defer marking this
                // triggered until a tick where `RequestNextFile` can
                // actually be reported instead of silently dropping it.
                if !self.streams[i].prepare_triggered
                    && self.streams[i].frames_sent >= self.streams[i].prepare_next_at_frame
                    && outcome == TickOutcome::Idle
                {
                    self.streams[i].prepare_triggered = true;
                    outcome = TickOutcome::RequestNextFile;
                }

                if !self.streams[i].play_next_triggered
                    && self.streams[i].frames_sent >= self.streams[i].play_next_at_frame
                {
                    self.streams[i].play_next_triggered = true;
                    let crossfade_ms = self.config.crossfade_ms;
                    if crossfade_ms > 0 && i + 1 < self.streams.len() {
                        self.streams[i].fade_both(1.0, 0.0, crossfade_ms);
                        self.streams[i + 1].fade_both(0.0, 1.0, crossfade_ms);
                    }
                    if i + 1 < self.streams.len() {
                        self.current = Some(i + 1);
                    }
                }
            }

            i += 1;
        }

        outcome
    }

    /// `ProcessStream`: read one packet's worth of samples and push them
    /// to both sinks. Returns `false` when the stream has nothing left and
    /// should be retired.
    fn process_stream(&mut self, idx: usize) -> bool {
        let stream = &mut self.streams[idx];
        let first_play = !stream.started;
        if first_play {
            stream.resume_both();
            stream.started = true;
        }

        if first_play && stream.start_offset_ms != 0 {
            // First-play resume wins over any seek requested while the
            // stream hadn't started yet (S5) — discard it outright.
            stream.seek_frame = None;
            let rate = stream.primary_format.sample_rate.max(1) as i64;
            stream.primary_decoder.seek(stream.start_offset_ms);
            stream.frames_sent = stream.start_offset_ms * rate / 1000;
        } else if let Some(seek_frame) = stream.seek_frame.take() {
            let ms = if stream.primary_format.sample_rate > 0 {
                seek_frame * 1000 / stream.primary_format.sample_rate as i64
            } else {
                0
            };
            stream.primary_decoder.seek(ms);
            stream.frames_sent = seek_frame;
        }

        self.apply_speed(idx);

        let stream = &mut self.streams[idx];
        if stream.primary_decoder.status() == DecoderStatus::Ended && stream.primary_decoder.data_size() == 0 {
            return false;
        }

        stream.primary_decoder.read_samples(64 * 1024);
        let accepted = self.queue_data(idx);
        if accepted > 0 {
            let bpf = self.streams[idx].bytes_per_frame().max(1) as i64;
            self.streams[idx].frames_sent += accepted as i64 / bpf;
        }

        if self.streams[idx].shares_decoder() {
            self.queue_data_shared(idx);
        } else {
            self.queue_data2(idx);
        }

        true
    }

    /// FF/RW bookkeeping: while `speed != 1.0`, nudge `frames_sent` by
    /// `sampleRate·(speed−1)` each tick and re-seek the decoder to the
    /// adjusted position every half second, so playback audibly tracks
    /// the requested speed instead of just decoding in real time.
    fn apply_speed(&mut self, idx: usize) {
        let stream = &mut self.streams[idx];
        if stream.speed == 1.0 {
            stream.next_reseek_at = None;
            return;
        }

        let rate = stream.primary_format.sample_rate.max(1) as f64;
        stream.frames_sent += (rate * (stream.speed - 1.0)) as i64;
        stream.frames_sent = stream.frames_sent.max(0);

        let now = std::time::Instant::now();
        let due = stream.next_reseek_at.map(|at| now >= at).unwrap_or(true);
        if due {
            let ms = stream.frames_sent * 1000 / rate as i64;
            stream.primary_decoder.seek(ms);
            stream.next_reseek_at = Some(now + Duration::from_millis(500));
        }
    }

    /// Set FF/RW speed on the current stream; `1.0` resumes normal
    /// playback and cancels the periodic re-seek.
    pub fn set_speed(&mut self, speed: f64) {
        if let Some(idx) = self.current {
            self.streams[idx].speed = speed;
        }
    }

    /// `QueueData`: push up to `min(decoder.available, sink.space/bpf)`
    /// bytes to the primary sink.
    fn queue_data(&mut self, idx: usize) -> usize {
        let stream = &mut self.streams[idx];
        queue_data_into(&mut *stream.primary_decoder, &mut *stream.primary_sink)
    }

    /// Shared-decoder dual output: mirror the same bytes to the secondary
    /// sink, honoring any discard credit `SyncStreams2` set.
    fn queue_data_shared(&mut self, idx: usize) {
        let stream = &mut self.streams[idx];
        let Some(sink2) = stream.secondary_sink.as_mut() else { return };

        let available = stream.primary_decoder.data_size();
        if available == 0 {
            return;
        }
        let data = stream.primary_decoder.data();

        let discard = stream.discard_samples.max(0) as usize;
        let skip = discard.min(data.len());
        stream.discard_samples = (stream.discard_samples - skip as i64).max(0);

        if skip < data.len() {
            sink2.add_data(&data[skip..]);
        }
    }

    /// `QueueData2`: analogous push through a dedicated secondary decoder.
    fn queue_data2(&mut self, idx: usize) {
        let stream = &mut self.streams[idx];
        let Some(dec2) = stream.secondary_decoder.as_mut() else { return };
        let Some(sink2) = stream.secondary_sink.as_mut() else { return };

        dec2.read_samples(64 * 1024);
        let accepted = queue_data_into(&mut **dec2, &mut **sink2);
        if accepted > 0 {
            let bpf = stream.secondary_format.as_ref().map(|f| f.bytes_per_frame()).unwrap_or(1).max(1) as i64;
            stream.frames_sent2 += accepted as i64 / bpf;
        }
    }

    /// `SyncStreams2`: periodically measure each sink's logical playback
    /// position and pad or credit-discard the secondary to keep it within
    /// 50 ms of the primary. No-op outside shared-decoder, normal-speed,
    /// both-sinks-non-dumb conditions (S4: secondary absent is a no-op).
    fn maybe_sync_streams2(&mut self, idx: usize) {
        if self.elapsed_since_sync < SYNC_STREAMS2_MIN_INTERVAL {
            self.elapsed_since_sync += Duration::from_millis(10);
            return;
        }
        self.elapsed_since_sync = Duration::ZERO;
        self.sync_streams2(idx);
    }

    fn sync_streams2(&mut self, idx: usize) {
        let stream = &mut self.streams[idx];
        if !stream.shares_decoder() {
            return;
        }
        let Some(sink2) = stream.secondary_sink.as_mut() else { return };
        if sink2.is_dumb() || stream.primary_sink.is_dumb() {
            return;
        }

        let rate1 = stream.primary_format.sample_rate.max(1) as f64;
        let rate2 = stream
            .secondary_format
            .as_ref()
            .map(|f| f.sample_rate)
            .unwrap_or(stream.primary_format.sample_rate)
            .max(1) as f64;

        let t1 = stream.frames_sent as f64 / rate1 * 1000.0
            - crate::types::ticks_to_ms(stream.primary_sink.delay());
        let t2 = stream.frames_sent as f64 / rate2 * 1000.0 - crate::types::ticks_to_ms(sink2.delay());
        let timediff = t2 - t1;

        if timediff > SYNC_STREAMS2_THRESHOLD_MS {
            let bpf = stream.secondary_format.as_ref().map(|f| f.bytes_per_frame()).unwrap_or(4) as f64;
            let pad_frames = (timediff / 1000.0 * rate2) as usize;
            let pad_bytes = (pad_frames as f64 * bpf) as usize;
            let pad_bytes = pad_bytes.min(sink2.space());
            if pad_bytes > 0 {
                sink2.add_data(&vec![0u8; pad_bytes]);
            }
        } else if timediff < -SYNC_STREAMS2_THRESHOLD_MS {
            let bpf = stream.secondary_format.as_ref().map(|f| f.bytes_per_frame()).unwrap_or(4) as f64;
            let frames = (-timediff / 1000.0 * rate2) as i64;
            stream.discard_samples += (frames as f64 * bpf) as i64;
        }
    }

    fn reap_finishing(&mut self) {
        self.finishing.retain(|s| !s.is_drained());
    }

    /// Retire the stream at `idx`, which may or may not be `self.current`
    /// (an outgoing stream mid-crossfade retires once its fade-out ends,
    /// by which point `current` already points at its successor).
    /// Shifts `self.current` to track the removal.
    fn retire_at(&mut self, idx: usize) {
        let mut stream = self.streams.remove(idx);
        stream.finishing = true;
        stream.drain_both();
        self.finishing.push(stream);

        self.current = match self.current {
            Some(cur) if cur == idx => {
                if self.streams.is_empty() {
                    None
                } else {
                    Some(idx.min(self.streams.len() - 1))
                }
            }
            Some(cur) if cur > idx => Some(cur - 1),
            other => other,
        };
    }

    /// Request a seek on the current stream; takes effect on the next
    /// `process_stream` call (S5).
    pub fn seek_current(&mut self, ms: i64) {
        if let Some(idx) = self.current {
            let stream = &mut self.streams[idx];
            let rate = stream.primary_format.sample_rate.max(1) as i64;
            stream.seek_frame = Some(ms * rate / 1000);
        }
    }

    /// Fade every active stream over `FAST_XFADE_TIME_MS`, in lock-step
    /// across both sinks. Blocks for the fade duration when `wait` is set.
    pub fn soft_stop(&mut self, wait: bool) {
        for stream in &mut self.streams {
            stream.fade_both(1.0, 0.0, FAST_XFADE_TIME_MS);
        }
        if wait {
            std::thread::sleep(Duration::from_millis(FAST_XFADE_TIME_MS as u64));
            let mut spins = 0;
            while self.streams.iter().any(|s| s.is_fading()) && spins < 1_000 {
                std::thread::sleep(Duration::from_millis(1));
                spins += 1;
            }
        }
    }

    pub fn soft_start(&mut self, wait: bool) {
        for stream in &mut self.streams {
            stream.fade_both(0.0, 1.0, FAST_XFADE_TIME_MS);
        }
        if wait {
            std::thread::sleep(Duration::from_millis(FAST_XFADE_TIME_MS as u64));
        }
    }

    /// Crossfade cap applied when the user explicitly skips to the next
    /// track rather than letting it play out naturally.
    pub fn skip_to_next_crossfade_ms(&self) -> u32 {
        self.config.crossfade_ms.min(SKIP_CROSSFADE_CAP_MS)
    }
}

fn queue_data_into(decoder: &mut dyn AudioDecoder, sink: &mut dyn AudioSink) -> usize {
    let available = decoder.data_size();
    if available == 0 {
        return 0;
    }
    let data = decoder.data();
    let space = sink.space();
    let take = available.min(space).min(data.len());
    if take == 0 {
        return 0;
    }
    let accepted = sink.add_data(&data[..take]);
    decoder.consume(accepted);
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ToneDecoder;
    use crate::sink::test_support::{test_format, MemSink};

    fn inputs(frames: u64) -> NewStreamInputs {
        let fmt = test_format();
        NewStreamInputs {
            primary_decoder: Box::new(ToneDecoder::new(fmt.clone(), frames)),
            primary_sink: Box::new(MemSink::new(fmt.clone())),
            primary_format: fmt,
            secondary: None,
            album_key: None,
            start_offset_ms: 0,
        }
    }

    #[test]
    fn queueing_first_file_becomes_current() {
        let mut player = MusicPlayer::new(MusicPlayerConfig::default());
        player.queue_next_file(inputs(1 << 16), 48_000).unwrap();
        assert_eq!(player.active_count(), 1);
        assert_eq!(player.current, Some(0));
    }

    #[test]
    fn second_file_without_crossfade_slaves_to_current() {
        let mut player = MusicPlayer::new(MusicPlayerConfig::default());
        player.queue_next_file(inputs(1 << 16), 48_000).unwrap();
        player.queue_next_file(inputs(1 << 16), 48_000).unwrap();
        assert!(player.streams[1].is_slaved);
    }

    #[test]
    fn album_gapless_suppresses_configured_crossfade() {
        let mut config = MusicPlayerConfig::default();
        config.crossfade_ms = 3_000;
        config.crossfade_album_tracks = true;
        let mut player = MusicPlayer::new(config);

        let mut first = inputs(1 << 16);
        first.album_key = Some(AlbumKey { album: "Remain in Light".into(), disc: 1, track: 1 });
        player.queue_next_file(first, 48_000).unwrap();

        let mut second = inputs(1 << 16);
        second.album_key = Some(AlbumKey { album: "Remain in Light".into(), disc: 1, track: 2 });
        player.queue_next_file(second, 48_000).unwrap();

        // Crossfade forced to 0 -> gapless slave chain, not a timed fade.
        assert!(player.streams[1].is_slaved);
    }

    #[test]
    fn frames_sent_is_monotone_across_ticks() {
        let mut player = MusicPlayer::new(MusicPlayerConfig::default());
        player.queue_next_file(inputs(1 << 20), 48_000).unwrap();

        let mut last = 0;
        for _ in 0..50 {
            player.tick();
            if let Some(idx) = player.current {
                let now = player.streams[idx].frames_sent;
                assert!(now >= last);
                last = now;
            }
        }
    }

    #[test]
    fn seek_current_sets_pending_seek_frame() {
        let mut player = MusicPlayer::new(MusicPlayerConfig::default());
        player.queue_next_file(inputs(1 << 20), 48_000).unwrap();
        player.seek_current(5_000);
        assert_eq!(player.streams[0].seek_frame, Some(5_000 * 48_000 / 1000));
    }

    #[test]
    fn seek_before_start_is_overridden_by_resume_offset() {
        // S5: startOffset=10_000ms, seek requested to 5_000ms before the
        // stream has actually started -> decoder ends up at startOffset,
        // not the requested seek target, and framesSent matches it.
        let mut player = MusicPlayer::new(MusicPlayerConfig::default());
        let mut file = inputs(1 << 20);
        file.start_offset_ms = 10_000;
        player.queue_next_file(file, 48_000).unwrap();

        player.seek_current(5_000);
        assert!(!player.streams[0].started, "first tick hasn't run yet");

        player.tick();

        // framesSent landed at startOffset (plus whatever this same tick
        // queued past it), never anywhere near the discarded 5_000ms seek.
        let start_offset_frames = 10_000 * 48_000 / 1000;
        let requested_seek_frames = 5_000 * 48_000 / 1000;
        assert!(player.streams[0].frames_sent >= start_offset_frames);
        assert!(player.streams[0].frames_sent < start_offset_frames + 48_000 / 10);
        assert!(player.streams[0].frames_sent > requested_seek_frames + 48_000 / 10);
        assert_eq!(player.streams[0].seek_frame, None);
        assert_eq!(player.streams[0].speed, 1.0);
    }

    #[test]
    fn ff_speed_advances_frames_sent_faster_than_normal() {
        let mut player = MusicPlayer::new(MusicPlayerConfig::default());
        player.queue_next_file(inputs(1 << 20), 48_000).unwrap();
        player.tick();
        let normal_tick_frames = player.streams[0].frames_sent;

        player.set_speed(2.0);
        let before = player.streams[0].frames_sent;
        player.tick();
        let after = player.streams[0].frames_sent;
        assert!(after - before > normal_tick_frames, "2x speed should advance frames_sent faster than a single normal tick");
    }
}
