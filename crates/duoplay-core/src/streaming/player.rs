//! StreamingAudioPlayer: the A/V-synced streaming audio thread
//!
//! Grounded on `CDVDPlayerAudio` (DVDPlayerAudio.cpp): a message-driven
//! decode loop that keeps the primary sink locked to an external clock
//! while mirroring output to an optional secondary sink.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::decoder::AudioDecoder;
use crate::message::{Message, MessageQueue, Priority};
use crate::pts_map::PtsMap;
use crate::sink::AudioSink;
use crate::streaming::sync::{DualSinkAligner, RefClock, SyncAction, SyncController, SyncType};
use crate::types::{AudioFrame, DVD_NOPTS_VALUE};

/// One iteration's outcome, surfaced mainly so tests can drive the loop
/// deterministically instead of spawning a real thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    ProducedFrame,
    HandledMessage,
    TimedOut,
    Stopped,
}

/// Shared, lock-free snapshot of playback state a UI thread can poll
/// without touching the decode loop's internals.
pub struct PlayerAtomics {
    pub frames_sent: AtomicI64,
    pub stalled: AtomicBool,
}

impl PlayerAtomics {
    fn new() -> Self {
        Self { frames_sent: AtomicI64::new(0), stalled: AtomicBool::new(false) }
    }
}

pub struct StreamingAudioPlayer {
    queue: Arc<MessageQueue>,
    stop: Arc<AtomicBool>,
    atomics: Arc<PlayerAtomics>,

    primary_decoder: Box<dyn AudioDecoder>,
    secondary_decoder: Option<Box<dyn AudioDecoder>>,

    primary_sink: Box<dyn AudioSink>,
    secondary_sink: Option<Box<dyn AudioSink>>,
    /// Per the spec's open question (b): every secondary-slot call must be
    /// guarded by a freshly read flag rather than an `is_some()` captured
    /// once at stream start, so a mid-stream downgrade takes effect
    /// immediately.
    has_secondary: bool,

    pts_map: PtsMap,
    sync: SyncController,
    aligner: DualSinkAligner,

    silence: bool,
    paused_awaiting_start: bool,
    /// `1.0` is normal playback; negative is rewind; `>1.0` is
    /// fast-forward. Drives `message_priority_floor` per 4.2.2 step 3.
    speed: f64,
    audio_clock: i64,
}

impl StreamingAudioPlayer {
    pub fn new(
        queue: Arc<MessageQueue>,
        primary_decoder: Box<dyn AudioDecoder>,
        primary_sink: Box<dyn AudioSink>,
        secondary_decoder: Option<Box<dyn AudioDecoder>>,
        secondary_sink: Option<Box<dyn AudioSink>>,
        sync_type: SyncType,
        max_speed_adjust: f64,
    ) -> Self {
        let has_secondary = secondary_sink.is_some();
        Self {
            queue,
            stop: Arc::new(AtomicBool::new(false)),
            atomics: Arc::new(PlayerAtomics::new()),
            primary_decoder,
            secondary_decoder,
            primary_sink,
            secondary_sink,
            has_secondary,
            pts_map: PtsMap::new(),
            sync: SyncController::new(sync_type, max_speed_adjust),
            aligner: DualSinkAligner::new(),
            silence: false,
            paused_awaiting_start: true,
            speed: 1.0,
            audio_clock: 0,
        }
    }

    pub fn atomics(&self) -> Arc<PlayerAtomics> {
        self.atomics.clone()
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn frames_sent(&self) -> i64 {
        self.atomics.frames_sent.load(Ordering::Relaxed)
    }

    /// Downgrade to primary-only for the remainder of the stream. Called
    /// whenever any secondary-slot operation fails (error handling design,
    /// "secondary-slot failure" — silent, never propagates to primary).
    fn downgrade_secondary(&mut self) {
        self.has_secondary = false;
        self.secondary_sink = None;
        self.secondary_decoder = None;
    }

    /// Runs until `stop` is set, processing messages and decoding frames
    /// per the 4.2.2 decode loop ordering.
    pub fn run(&mut self, clock: &mut dyn RefClock) {
        while !self.stop.load(Ordering::Relaxed) {
            if self.step(clock) == StepOutcome::Stopped {
                break;
            }
        }
    }

    /// A single decode-loop iteration. Public so tests (and the
    /// scenario tests in section 8) can drive it deterministically.
    pub fn step(&mut self, clock: &mut dyn RefClock) -> StepOutcome {
        if self.stop.load(Ordering::Relaxed) {
            return StepOutcome::Stopped;
        }

        if self.primary_decoder.data_size() > 0 {
            return self.decode_and_output(clock);
        }

        let wait = self.message_wait_timeout();
        let min_priority = self.message_priority_floor();

        match self.queue.get(wait, min_priority) {
            Some(msg) => {
                self.dispatch(msg);
                StepOutcome::HandledMessage
            }
            None => {
                self.atomics.stalled.store(true, Ordering::Relaxed);
                StepOutcome::TimedOut
            }
        }
    }

    /// `1000 * primary.CacheTime + 100` ms per spec 4.2.2 step 3.
    fn message_wait_timeout(&self) -> Duration {
        let cache_time_ticks = self.primary_sink.cache_time();
        let cache_ms = crate::types::ticks_to_ms(cache_time_ticks).max(0.0);
        Duration::from_millis((1000.0 * cache_ms + 100.0) as u64)
    }

    /// Per 4.2.2 step 3: block for data (priority 0) whenever
    /// paused-awaiting-start, playing normal, rewinding, or
    /// fast-forwarding while audio is still behind the clock. Otherwise
    /// (FF already caught up) drain control messages only, so flush/
    /// reset/seek traffic isn't starved behind stale decoded frames.
    fn message_priority_floor(&self) -> Priority {
        if self.paused_awaiting_start || self.speed <= 1.0 {
            return Priority::Data;
        }
        let playing_pts = self.primary_sink.playing_pts();
        if playing_pts == crate::types::DVD_NOPTS_VALUE || playing_pts < self.audio_clock {
            Priority::Data
        } else {
            Priority::Control
        }
    }

    fn decode_and_output(&mut self, clock: &mut dyn RefClock) -> StepOutcome {
        let available = self.primary_decoder.data_size() as i64;
        let pts = self.pts_map.get(available, true);

        let primary_format = self.primary_decoder.data_format();
        let mut primary_frame = AudioFrame {
            data: self.primary_decoder.data().to_vec(),
            pts,
            duration: estimate_duration_ticks(available as usize, &primary_format),
            encoded_sample_rate: primary_format.encoded_sample_rate,
            passthrough: primary_format.is_passthrough,
        };
        self.primary_decoder.consume(primary_frame.size());

        let mut secondary_frame = if self.has_secondary {
            if let Some(dec) = self.secondary_decoder.as_mut() {
                let size = dec.data_size();
                if size > 0 {
                    let fmt = dec.data_format();
                    let frame = AudioFrame {
                        data: dec.data().to_vec(),
                        pts,
                        duration: estimate_duration_ticks(size, &fmt),
                        encoded_sample_rate: fmt.encoded_sample_rate,
                        passthrough: fmt.is_passthrough,
                    };
                    dec.consume(size);
                    frame
                } else {
                    AudioFrame::empty()
                }
            } else {
                // Shared-decoder dual output: secondary mirrors primary's bytes.
                primary_frame.clone()
            }
        } else {
            AudioFrame::empty()
        };

        self.sync.set_passthrough(primary_frame.passthrough);

        if self.silence {
            primary_frame.silence_in_place();
            secondary_frame.silence_in_place();
        }

        self.output_stage(&mut primary_frame, &mut secondary_frame, clock);
        StepOutcome::ProducedFrame
    }

    fn output_stage(
        &mut self,
        primary_frame: &mut AudioFrame,
        secondary_frame: &mut AudioFrame,
        clock: &mut dyn RefClock,
    ) {
        if !self.primary_sink.is_valid_format(&crate::types::AudioFormat {
            sample_rate: primary_frame.encoded_sample_rate,
            encoded_sample_rate: primary_frame.encoded_sample_rate,
            channel_layout: crate::types::ChannelLayout::STEREO,
            sample_format: crate::types::SampleFormat::Float32,
            is_passthrough: primary_frame.passthrough,
            codec_id: self.primary_decoder.codec(),
        }) {
            self.primary_sink.drain();
        }

        // Compute the primary's sync action first so the secondary's
        // write count (once, twice, or dropped) can mirror it exactly —
        // SKIPDUP's skip/dup decision must apply identically to both
        // sinks or they drift out of sample alignment (4.2.3/4.2.4).
        let primary_action = self.sync.handle_frame(
            self.primary_sink.playing_pts(),
            clock,
            primary_frame.duration,
            false,
        );

        if self.has_secondary {
            let align_action = self.aligner.align(
                self.primary_sink.delay(),
                self.secondary_sink.as_ref().map(|s| s.delay()).unwrap_or(0),
                secondary_frame,
                self.secondary_sink.as_ref().map(|s| s.is_dumb()).unwrap_or(true),
            );
            self.write_secondary(primary_action, align_action, secondary_frame);
        }

        self.apply_sync_action(primary_action, primary_frame);
        self.audio_clock = clock.now();
        self.atomics.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.atomics.stalled.store(false, Ordering::Relaxed);
    }

    /// Mirrors the primary's write/drop/duplicate decision onto the
    /// secondary sink, composed with the dual-sink aligner's
    /// silence-stuff/skip decision for this frame.
    fn write_secondary(
        &mut self,
        primary_action: SyncAction,
        align_action: crate::streaming::sync::DualSinkAction,
        frame: &AudioFrame,
    ) {
        use crate::streaming::sync::DualSinkAction;
        let Some(sink) = self.secondary_sink.as_mut() else { return };

        if align_action == DualSinkAction::Skip {
            return;
        }

        match primary_action {
            SyncAction::WriteOnce | SyncAction::WriteWithResample { .. } => {
                sink.add_data(&frame.data);
            }
            SyncAction::WriteTwice => {
                sink.add_data(&frame.data);
                sink.add_data(&frame.data);
            }
            SyncAction::Drop => {}
        }
        sink.set_playing_pts(frame.pts);
    }

    fn apply_sync_action(&mut self, action: SyncAction, frame: &AudioFrame) {
        match action {
            SyncAction::WriteOnce => {
                self.primary_sink.add_data(&frame.data);
            }
            SyncAction::WriteTwice => {
                self.primary_sink.add_data(&frame.data);
                self.primary_sink.add_data(&frame.data);
            }
            SyncAction::Drop => {
                // Still set playing-pts on both sinks to keep them in
                // sync per 4.2.5, even though no bytes were written.
            }
            SyncAction::WriteWithResample { ratio } => {
                self.primary_sink.set_resample_ratio(ratio);
                self.primary_sink.add_data(&frame.data);
            }
        }
        self.primary_sink.set_playing_pts(frame.pts);
    }

    fn dispatch(&mut self, message: Message) {
        match message {
            Message::DemuxerPacket { bytes, pts, duration } => {
                self.pts_map.add(bytes.len() as i64, pts);
                self.primary_decoder.read_samples(bytes.len());
                if self.has_secondary {
                    if let Some(dec) = self.secondary_decoder.as_mut() {
                        dec.read_samples(bytes.len());
                    }
                }
                let _ = duration;
            }
            Message::GeneralSynchronize { deadline } => {
                if std::time::Instant::now() > deadline {
                    self.queue.requeue_as_control(Message::GeneralSynchronize { deadline });
                }
            }
            Message::GeneralResync { ts, set_clock } => {
                self.audio_clock = ts;
                self.pts_map.flush();
                if set_clock {
                    self.primary_sink.set_playing_pts(ts);
                }
            }
            Message::GeneralReset | Message::GeneralFlush => {
                self.primary_sink.flush();
                if self.has_secondary {
                    if let Some(sink) = self.secondary_sink.as_mut() {
                        sink.flush();
                    }
                }
                self.pts_map.flush();
                self.queue.flush();
            }
            Message::GeneralEof => {
                self.primary_sink.drain();
            }
            Message::GeneralDelay { seconds } => {
                std::thread::sleep(Duration::from_secs_f64(seconds.max(0.0)));
            }
            Message::GeneralStreamChange => {}
            Message::PlayerStarted => {
                self.paused_awaiting_start = false;
            }
            Message::PlayerDisplayTime { .. } => {}
            Message::PlayerSetSpeed { speed } => {
                self.speed = speed;
            }
            Message::AudioSilence { silent } => {
                self.silence = silent;
            }
        }
    }
}

fn estimate_duration_ticks(bytes: usize, format: &crate::types::AudioFormat) -> i64 {
    let bpf = format.bytes_per_frame().max(1) as usize;
    let frames = bytes / bpf;
    if format.sample_rate == 0 {
        0
    } else {
        (frames as i64) * crate::types::DVD_TIME_BASE / format.sample_rate as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ToneDecoder;
    use crate::sink::test_support::{test_format, MemSink};

    struct FakeClock {
        now: i64,
    }
    impl RefClock for FakeClock {
        fn now(&self) -> i64 {
            self.now
        }
        fn speed(&self) -> f64 {
            1.0
        }
        fn discontinuity(&mut self, new_clock: i64) {
            self.now = new_clock;
        }
        fn refresh_period(&self) -> Option<i64> {
            None
        }
    }

    fn make_player(with_secondary: bool) -> (StreamingAudioPlayer, Arc<MessageQueue>) {
        let queue = Arc::new(MessageQueue::new());
        let fmt = test_format();
        let mut tone = ToneDecoder::new(fmt.clone(), 1 << 20);
        tone.start(0);
        let primary_decoder: Box<dyn AudioDecoder> = Box::new(tone);
        let primary_sink = Box::new(MemSink::new(fmt.clone()));
        let (secondary_decoder, secondary_sink): (
            Option<Box<dyn AudioDecoder>>,
            Option<Box<dyn AudioSink>>,
        ) = if with_secondary {
            (None, Some(Box::new(MemSink::new(fmt))))
        } else {
            (None, None)
        };

        let player = StreamingAudioPlayer::new(
            queue.clone(),
            primary_decoder,
            primary_sink,
            secondary_decoder,
            secondary_sink,
            SyncType::Discon,
            0.05,
        );
        (player, queue)
    }

    #[test]
    fn player_started_clears_paused_flag() {
        let (mut player, _queue) = make_player(false);
        player.dispatch(Message::PlayerStarted);
        assert!(!player.paused_awaiting_start);
    }

    #[test]
    fn frames_sent_advances_once_packets_are_fed() {
        let (mut player, queue) = make_player(false);
        player.dispatch(Message::PlayerStarted);
        let mut clock = FakeClock { now: 0 };

        for i in 0..32 {
            queue.put(Message::DemuxerPacket { bytes: vec![0u8; 4096], pts: i * 20_000, duration: 20_000 });
        }

        let mut last = player.frames_sent();
        for _ in 0..64 {
            player.step(&mut clock);
            let now = player.frames_sent();
            assert!(now >= last);
            last = now;
        }
        assert!(last > 0, "expected the decode loop to have produced at least one frame");
    }

    #[test]
    fn flush_resets_pts_map_and_sink() {
        let (mut player, _queue) = make_player(false);
        player.pts_map.add(10, 5_000_000);
        player.dispatch(Message::GeneralFlush);
        assert!(player.pts_map.is_empty());
    }

    #[test]
    fn barrier_requeues_as_control_when_deadline_passed() {
        let (mut player, _queue) = make_player(false);
        let past = std::time::Instant::now() - Duration::from_secs(1);
        player.dispatch(Message::GeneralSynchronize { deadline: past });
        assert_eq!(player.queue.len(), 1);
    }

    #[test]
    fn secondary_failure_downgrade_makes_secondary_inert() {
        let (mut player, _queue) = make_player(true);
        assert!(player.has_secondary);
        player.downgrade_secondary();
        assert!(!player.has_secondary);
        assert!(player.secondary_sink.is_none());
    }
}
