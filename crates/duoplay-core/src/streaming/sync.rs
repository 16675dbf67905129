//! Sync controller and dual-sink alignment
//!
//! Grounded directly on Kodi's `CDVDPlayerAudio::HandleSyncError` /
//! `OutputPacket` / `HandleSyncAudio2` (DVDPlayerAudio.cpp). Constants and
//! thresholds are carried over verbatim; only naming and Rust idiom change.

use crate::types::{AudioFrame, DVD_TIME_BASE};

const PROPORTIONAL: f64 = 20.0;
const PROPREF: f64 = 0.01;
const PROPDIVMIN: f64 = 2.0;
const PROPDIVMAX: f64 = 40.0;
const INTEGRAL: f64 = 200.0;

const COARSE_DISCON_LIMIT_TICKS: i64 = DVD_TIME_BASE / 10; // 100ms
const DEFAULT_DISCON_LIMIT_TICKS: i64 = DVD_TIME_BASE / 100; // 10ms
const DUAL_SINK_MIN_THRESHOLD_TICKS: i64 = DVD_TIME_BASE / 20; // 50ms

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    Discon,
    SkipDup,
    Resample,
}

/// What the sync controller wants the caller to do with the pending frame
/// this iteration. The caller (the streaming player's output stage) is
/// responsible for actually touching the sinks/clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncAction {
    /// Write the frame once to both sinks.
    WriteOnce,
    /// Drop the frame, crediting its duration to the error accumulator.
    Drop,
    /// Write the frame twice, debiting its duration from the accumulator.
    WriteTwice,
    /// Apply `ratio` via `AudioSink::set_resample_ratio` then write once.
    WriteWithResample { ratio: f64 },
}

/// Reference clock contract the sync controller drives. Kept minimal and
/// out of scope per spec section 1 — only the operations the controller
/// needs.
pub trait RefClock {
    fn now(&self) -> i64;
    fn speed(&self) -> f64;
    /// Force the clock to `new_clock`, e.g. after a coarse discontinuity.
    fn discontinuity(&mut self, new_clock: i64);
    /// Video refresh period in ticks, if a display clock is driving sync.
    fn refresh_period(&self) -> Option<i64>;
}

/// Tracks the rolling 2-second error window and per-mode correction state
/// described in spec 4.2.3.
pub struct SyncController {
    sync_type: SyncType,
    requested_sync_type: SyncType,
    error_window: Vec<i64>,
    window_span_ticks: i64,
    error: i64,
    integral: f64,
    resample_ratio: f64,
    prev_skipped: bool,
    max_speed_adjust: f64,
}

impl SyncController {
    pub fn new(sync_type: SyncType, max_speed_adjust: f64) -> Self {
        Self {
            sync_type,
            requested_sync_type: sync_type,
            error_window: Vec::new(),
            window_span_ticks: 0,
            error: 0,
            integral: 0.0,
            resample_ratio: 1.0,
            prev_skipped: false,
            max_speed_adjust,
        }
    }

    pub fn sync_type(&self) -> SyncType {
        self.sync_type
    }

    pub fn resample_ratio(&self) -> f64 {
        self.resample_ratio
    }

    /// Passthrough frames force SKIPDUP regardless of configuration:
    /// resampling a bit-exact encoded stream is meaningless (S1).
    pub fn set_passthrough(&mut self, passthrough: bool) {
        self.sync_type = if passthrough && self.requested_sync_type == SyncType::Resample {
            SyncType::SkipDup
        } else {
            self.requested_sync_type
        };
    }

    pub fn set_requested_sync_type(&mut self, sync_type: SyncType) {
        self.requested_sync_type = sync_type;
    }

    fn flush_window(&mut self) {
        self.error_window.clear();
        self.window_span_ticks = 0;
        self.error = 0;
    }

    /// Call once per produced frame with the current playing pts, the
    /// reference clock, and the frame's duration (for the 2-second
    /// accumulator's span tracking). Returns the action to apply to this
    /// frame.
    pub fn handle_frame(
        &mut self,
        playing_pts: i64,
        clock: &mut dyn RefClock,
        frame_duration_ticks: i64,
        force_resync: bool,
    ) -> SyncAction {
        if playing_pts == crate::types::DVD_NOPTS_VALUE {
            // No anchor yet (e.g. before the first pts-bearing frame) —
            // write through without feeding the error accumulator.
            return SyncAction::WriteOnce;
        }

        let now = clock.now();
        let error = playing_pts.saturating_sub(now);

        if error.unsigned_abs() as i64 > COARSE_DISCON_LIMIT_TICKS || force_resync {
            clock.discontinuity(now + error);
            self.flush_window();
            self.prev_skipped = false;
            return SyncAction::WriteOnce;
        }

        self.error_window.push(error);
        self.window_span_ticks += frame_duration_ticks.max(1);
        self.error = error;

        if self.window_span_ticks < 2 * DVD_TIME_BASE {
            return SyncAction::WriteOnce;
        }

        // Window full: apply the configured correction mode, then reset
        // the window for the next 2-second cycle.
        let action = match self.sync_type {
            SyncType::Discon => {
                self.apply_discon(clock);
                SyncAction::WriteOnce
            }
            SyncType::SkipDup => self.apply_skipdup(frame_duration_ticks),
            SyncType::Resample => {
                self.apply_resample(clock.speed());
                SyncAction::WriteWithResample { ratio: self.resample_ratio }
            }
        };

        self.error_window.clear();
        self.window_span_ticks = 0;
        action
    }

    fn apply_discon(&mut self, clock: &mut dyn RefClock) {
        let (limit, quantized_error) = if let Some(period) = clock.refresh_period() {
            let limit = period;
            let q = if self.error > 0 {
                limit * (self.error / limit)
            } else {
                limit * -((-self.error) / limit)
            };
            (limit, q)
        } else {
            (DEFAULT_DISCON_LIMIT_TICKS, self.error)
        };

        if quantized_error.abs() > limit - 1 {
            let now = clock.now();
            clock.discontinuity(now + quantized_error);
        }
    }

    fn apply_skipdup(&mut self, frame_duration_ticks: i64) -> SyncAction {
        let limit = (DVD_TIME_BASE / 100).max((2 * frame_duration_ticks) / 3);

        if self.error < -limit {
            self.prev_skipped = !self.prev_skipped;
            if self.prev_skipped {
                SyncAction::WriteOnce
            } else {
                self.error += frame_duration_ticks;
                SyncAction::Drop
            }
        } else if self.error > limit {
            self.error -= frame_duration_ticks;
            SyncAction::WriteTwice
        } else {
            SyncAction::WriteOnce
        }
    }

    fn apply_resample(&mut self, ref_speed: f64) {
        let err_seconds = self.error as f64 / DVD_TIME_BASE as f64;

        if err_seconds.abs() > 1.0 {
            self.integral = 0.0;
        } else if err_seconds.abs() > 0.005 {
            self.integral += err_seconds / INTEGRAL;
        }

        let proportional = if err_seconds.abs() > 0.0 {
            let div = (PROPORTIONAL * (PROPREF / err_seconds.abs())).clamp(PROPDIVMIN, PROPDIVMAX);
            err_seconds / div
        } else {
            0.0
        };

        let ratio = 1.0 / ref_speed + proportional + self.integral;
        let max_adjust = self.max_speed_adjust;
        self.resample_ratio = ratio.clamp(1.0 / ref_speed - max_adjust, 1.0 / ref_speed + max_adjust);
    }
}

/// Result of dual-sink alignment for the secondary frame this iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DualSinkAction {
    /// Write the (possibly silenced) secondary frame normally.
    Write,
    /// Stuff silence into the secondary frame's payload, still write it.
    StuffSilence,
    /// Skip the secondary sink entirely this iteration.
    Skip,
}

/// Tracks the "skip secondary until caught up" latch described in spec
/// 4.2.4. Suppressed entirely when the secondary sink is "dumb".
pub struct DualSinkAligner {
    skip: bool,
}

impl DualSinkAligner {
    pub fn new() -> Self {
        Self { skip: false }
    }

    /// `primary_delay`/`secondary_delay` are both in ticks, from
    /// `AudioSink::delay()`. Returns the action for `frame2` and mutates
    /// it in place when silence-stuffing is required.
    pub fn align(
        &mut self,
        primary_delay: i64,
        secondary_delay: i64,
        frame2: &mut AudioFrame,
        secondary_is_dumb: bool,
    ) -> DualSinkAction {
        if secondary_is_dumb {
            self.skip = false;
            return DualSinkAction::Write;
        }
        if frame2.size() == 0 {
            return DualSinkAction::Write;
        }

        let threshold = DUAL_SINK_MIN_THRESHOLD_TICKS.max(frame2.duration);
        let ddiff = primary_delay - secondary_delay;

        if ddiff > threshold {
            frame2.silence_in_place();
            return DualSinkAction::StuffSilence;
        }
        if ddiff < -threshold {
            self.skip = true;
        } else if self.skip && ddiff > 0 {
            self.skip = false;
        }

        if self.skip {
            DualSinkAction::Skip
        } else {
            DualSinkAction::Write
        }
    }
}

impl Default for DualSinkAligner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClock {
        now: i64,
        speed: f64,
        refresh_period: Option<i64>,
    }

    impl RefClock for FakeClock {
        fn now(&self) -> i64 {
            self.now
        }
        fn speed(&self) -> f64 {
            self.speed
        }
        fn discontinuity(&mut self, new_clock: i64) {
            self.now = new_clock;
        }
        fn refresh_period(&self) -> Option<i64> {
            self.refresh_period
        }
    }

    #[test]
    fn coarse_error_triggers_immediate_discontinuity() {
        let mut clock = FakeClock { now: 1_000_000, speed: 1.0, refresh_period: None };
        let mut ctrl = SyncController::new(SyncType::Discon, 0.05);

        // playing_pts is 150ms ahead of clock -> coarse resync (S2).
        let action = ctrl.handle_frame(1_150_000, &mut clock, 40_000, false);
        assert_eq!(action, SyncAction::WriteOnce);
        assert_eq!(clock.now, 1_150_000);
    }

    #[test]
    fn passthrough_forces_skipdup_over_resample() {
        let mut ctrl = SyncController::new(SyncType::Resample, 0.05);
        ctrl.set_passthrough(true);
        assert_eq!(ctrl.sync_type(), SyncType::SkipDup);
        ctrl.set_passthrough(false);
        assert_eq!(ctrl.sync_type(), SyncType::Resample);
    }

    #[test]
    fn resample_ratio_respects_max_speed_adjust() {
        let mut clock = FakeClock { now: 0, speed: 1.0, refresh_period: None };
        let mut ctrl = SyncController::new(SyncType::Resample, 0.05);

        // Drive a moderate, steady error through enough frames to fill
        // the 2-second window without tripping the coarse-resync path.
        let frame_duration = 40_000; // 40ms
        let mut last_action = SyncAction::WriteOnce;
        for i in 0..60 {
            clock.now = (i as i64) * frame_duration;
            let playing_pts = clock.now + 30_000; // steady 30ms error
            last_action = ctrl.handle_frame(playing_pts, &mut clock, frame_duration, false);
        }

        if let SyncAction::WriteWithResample { ratio } = last_action {
            assert!((ratio - 1.0).abs() <= 0.05 + 1e-9);
        }
        assert!((ctrl.resample_ratio() - 1.0).abs() <= 0.05 + 1e-9);
    }

    #[test]
    fn dual_sink_stuffs_silence_when_secondary_ahead() {
        let mut aligner = DualSinkAligner::new();
        let mut frame2 = AudioFrame {
            data: vec![1, 2, 3, 4],
            pts: 0,
            duration: 20_000,
            encoded_sample_rate: 48000,
            passthrough: false,
        };

        // primary delay much larger than secondary -> secondary is ahead.
        let action = aligner.align(200_000, 0, &mut frame2, false);
        assert_eq!(action, DualSinkAction::StuffSilence);
        assert!(frame2.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn dual_sink_skips_until_caught_up() {
        let mut aligner = DualSinkAligner::new();
        let mut frame2 = AudioFrame {
            data: vec![1, 2, 3, 4],
            pts: 0,
            duration: 20_000,
            encoded_sample_rate: 48000,
            passthrough: false,
        };

        // secondary delay much larger -> secondary is behind -> skip.
        let action = aligner.align(0, 200_000, &mut frame2, false);
        assert_eq!(action, DualSinkAction::Skip);

        // Once ddiff crosses back above 0, skip latch clears.
        let action = aligner.align(10, 0, &mut frame2, false);
        assert_eq!(action, DualSinkAction::Write);
    }

    #[test]
    fn dumb_secondary_suppresses_alignment() {
        let mut aligner = DualSinkAligner::new();
        let mut frame2 = AudioFrame {
            data: vec![1, 2, 3, 4],
            pts: 0,
            duration: 20_000,
            encoded_sample_rate: 48000,
            passthrough: false,
        };
        let action = aligner.align(0, 999_999, &mut frame2, true);
        assert_eq!(action, DualSinkAction::Write);
    }
}
