//! Typed, prioritized, size/time-bounded message channel to the audio thread
//!
//! Grounded in style on the teacher's `engine::command` lock-free queue
//! (variant-per-operation enum, boxed large payloads) but richer: this
//! queue needs priority-ordered insertion, a byte/time budget, and a
//! barrier re-queue path that a plain SPSC ring buffer can't express, so
//! it's backed by a `VecDeque` behind a mutex/condvar rather than `rtrb`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Default bound: 6 MiB of payload or 8 seconds of estimated playback,
/// whichever is hit first (spec section 4.2.1 / 6).
pub const DEFAULT_MAX_BYTES: usize = 6 * 1024 * 1024;
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Data = 0,
    Control = 1,
}

#[derive(Debug, Clone)]
pub enum Message {
    DemuxerPacket { bytes: Vec<u8>, pts: i64, duration: i64 },
    GeneralSynchronize { deadline: Instant },
    GeneralResync { ts: i64, set_clock: bool },
    GeneralReset,
    GeneralFlush,
    GeneralEof,
    GeneralDelay { seconds: f64 },
    GeneralStreamChange,
    PlayerStarted,
    PlayerDisplayTime { ts: i64 },
    PlayerSetSpeed { speed: f64 },
    AudioSilence { silent: bool },
}

impl Message {
    fn priority(&self) -> Priority {
        match self {
            Message::DemuxerPacket { .. } => Priority::Data,
            _ => Priority::Control,
        }
    }

    /// Approximate payload size, used against the queue's byte budget.
    fn size_bytes(&self) -> usize {
        match self {
            Message::DemuxerPacket { bytes, .. } => bytes.len(),
            _ => 64,
        }
    }

    /// Approximate playback duration this message represents, used
    /// against the queue's time budget. Only data messages count.
    fn duration(&self) -> Duration {
        match self {
            Message::DemuxerPacket { duration, .. } => {
                Duration::from_micros((*duration).max(0) as u64)
            }
            _ => Duration::ZERO,
        }
    }
}

struct Entry {
    message: Message,
    priority: Priority,
}

struct Inner {
    entries: VecDeque<Entry>,
    total_bytes: usize,
    total_duration: Duration,
    aborted: bool,
}

/// Bounded, priority-ordered message channel between caller threads
/// (demuxer, UI, settings) and the streaming audio thread.
///
/// Ordering guarantee: priority-0 (data) messages are FIFO among
/// themselves; any priority-1 (control) message jumps ahead of all
/// currently queued priority-0 messages.
pub struct MessageQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    max_bytes: usize,
    max_duration: Duration,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_BYTES, DEFAULT_MAX_DURATION)
    }

    pub fn with_limits(max_bytes: usize, max_duration: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                total_bytes: 0,
                total_duration: Duration::ZERO,
                aborted: false,
            }),
            not_empty: Condvar::new(),
            max_bytes,
            max_duration,
        }
    }

    /// True if pushing another data message would exceed the byte or
    /// time budget. Control messages are never throttled: they must
    /// always be able to reach the audio thread (flush/reset/abort).
    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.total_bytes >= self.max_bytes || inner.total_duration >= self.max_duration
    }

    pub fn put(&self, message: Message) {
        let priority = message.priority();
        let mut inner = self.inner.lock().unwrap();
        inner.total_bytes += message.size_bytes();
        inner.total_duration += message.duration();

        let entry = Entry { message, priority };

        if priority == Priority::Control {
            // Control jumps ahead of every queued data message but stays
            // behind any earlier control messages (control-FIFO among
            // themselves).
            let insert_at = inner
                .entries
                .iter()
                .position(|e| e.priority == Priority::Data)
                .unwrap_or(inner.entries.len());
            inner.entries.insert(insert_at, entry);
        } else {
            inner.entries.push_back(entry);
        }

        self.not_empty.notify_one();
    }

    /// Re-insert a message as priority-1 (control), used when a
    /// `GENERAL_SYNCHRONIZE` barrier times out waiting on its peer and
    /// must yield to other control traffic rather than deadlock it.
    pub fn requeue_as_control(&self, message: Message) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_bytes += message.size_bytes();
        inner.total_duration += message.duration();
        inner.entries.push_front(Entry { message, priority: Priority::Control });
        self.not_empty.notify_one();
    }

    /// Pop the next message, blocking up to `timeout`.
    ///
    /// `min_priority` controls which messages are visible: `Data` means
    /// "take the next message regardless of kind" (the decode loop's
    /// "block for data" case); `Control` means "only control messages,
    /// drain data later" (used while paused or not ready to accept more
    /// audio).
    pub fn get(&self, timeout: Duration, min_priority: Priority) -> Option<Message> {
        let mut inner = self.inner.lock().unwrap();
        let deadline = Instant::now() + timeout;

        loop {
            if inner.aborted {
                return None;
            }

            let pos = inner.entries.iter().position(|e| e.priority >= min_priority);
            if let Some(i) = pos {
                let entry = inner.entries.remove(i).unwrap();
                inner.total_bytes = inner.total_bytes.saturating_sub(entry.message.size_bytes());
                inner.total_duration = inner
                    .total_duration
                    .checked_sub(entry.message.duration())
                    .unwrap_or(Duration::ZERO);
                return Some(entry.message);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, timeout_result) =
                self.not_empty.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
            if timeout_result.timed_out() && inner.entries.is_empty() {
                return None;
            }
        }
    }

    /// Wake any blocked `get` and prevent further blocking, so the
    /// owning thread can be joined cleanly on close.
    pub fn abort(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.aborted = true;
        self.not_empty.notify_all();
    }

    pub fn reset_abort(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.aborted = false;
    }

    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.total_bytes = 0;
        inner.total_duration = Duration::ZERO;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_jumps_ahead_of_queued_data() {
        let q = MessageQueue::new();
        q.put(Message::DemuxerPacket { bytes: vec![0; 10], pts: 0, duration: 0 });
        q.put(Message::DemuxerPacket { bytes: vec![0; 10], pts: 1, duration: 0 });
        q.put(Message::GeneralFlush);

        let first = q.get(Duration::from_millis(10), Priority::Data).unwrap();
        assert!(matches!(first, Message::GeneralFlush));
    }

    #[test]
    fn data_messages_stay_fifo_among_themselves() {
        let q = MessageQueue::new();
        q.put(Message::DemuxerPacket { bytes: vec![], pts: 1, duration: 0 });
        q.put(Message::DemuxerPacket { bytes: vec![], pts: 2, duration: 0 });

        let Message::DemuxerPacket { pts: p1, .. } = q.get(Duration::from_millis(10), Priority::Data).unwrap() else { panic!() };
        let Message::DemuxerPacket { pts: p2, .. } = q.get(Duration::from_millis(10), Priority::Data).unwrap() else { panic!() };
        assert_eq!((p1, p2), (1, 2));
    }

    #[test]
    fn control_only_filter_skips_data() {
        let q = MessageQueue::new();
        q.put(Message::DemuxerPacket { bytes: vec![], pts: 0, duration: 0 });
        q.put(Message::GeneralFlush);

        let msg = q.get(Duration::from_millis(10), Priority::Control).unwrap();
        assert!(matches!(msg, Message::GeneralFlush));
        // Data message is still there, now at the front.
        let msg = q.get(Duration::from_millis(10), Priority::Data).unwrap();
        assert!(matches!(msg, Message::DemuxerPacket { .. }));
    }

    #[test]
    fn get_times_out_on_empty_queue() {
        let q = MessageQueue::new();
        assert!(q.get(Duration::from_millis(5), Priority::Data).is_none());
    }

    #[test]
    fn abort_wakes_blocked_get() {
        let q = MessageQueue::new();
        q.abort();
        assert!(q.get(Duration::from_secs(5), Priority::Data).is_none());
    }

    #[test]
    fn byte_budget_reports_full() {
        let q = MessageQueue::with_limits(16, Duration::from_secs(100));
        assert!(!q.is_full());
        q.put(Message::DemuxerPacket { bytes: vec![0; 20], pts: 0, duration: 0 });
        assert!(q.is_full());
    }
}
