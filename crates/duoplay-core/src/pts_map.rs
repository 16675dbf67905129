//! Maps decoded-byte offsets back to presentation timestamps
//!
//! Grounded on Kodi's `CPTSInputQueue` (DVDPlayerAudio.cpp): codecs report
//! how many bytes they decoded but not which packet those bytes came from,
//! so the player keeps a small ledger of "this many bytes belong to this
//! pts" entries and walks it to recover timing after the fact.

use std::collections::VecDeque;

use crate::types::DVD_NOPTS_VALUE;

struct Entry {
    byte_count: i64,
    pts: i64,
}

/// Insertion-ordered ledger of `{byte_count, pts}` entries for bytes still
/// in flight inside the decoder.
///
/// Invariant: the sum of `byte_count` across all entries is always ≥ the
/// number of decoded bytes still inside the codec that haven't been
/// attributed to a pts yet (I4 in the spec: a `Get` never returns a pts
/// older than the last `Flush`, since `Flush` clears the ledger outright).
pub struct PtsMap {
    entries: VecDeque<Entry>,
}

impl PtsMap {
    pub fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    /// Record that `bytes` newly-submitted bytes belong to `pts`.
    /// Prepended, mirroring the source's `m_list.insert(begin(), ...)` —
    /// `Get` always walks from the most recent entry.
    pub fn add(&mut self, bytes: i64, pts: i64) {
        self.entries.push_front(Entry { byte_count: bytes, pts });
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }

    /// Walk from the front, subtracting `byte_count` from `offset` until
    /// the query falls inside an entry; return that entry's pts.
    ///
    /// When `consume` is true, all entries at or after the hit (i.e. older
    /// than the byte range that produced the hit) are dropped — the next
    /// `Get` can never return a pts this call already handed out or
    /// anything preceding it.
    pub fn get(&mut self, offset: i64, consume: bool) -> i64 {
        let mut remaining = offset;
        let mut hit_index = None;

        for (i, entry) in self.entries.iter().enumerate() {
            if remaining <= entry.byte_count {
                hit_index = Some(i);
                break;
            }
            remaining -= entry.byte_count;
        }

        let Some(i) = hit_index else {
            return DVD_NOPTS_VALUE;
        };

        let pts = self.entries[i].pts;

        if consume {
            self.entries.truncate(i + 1);
            self.entries[i].pts = DVD_NOPTS_VALUE;
        }

        pts
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PtsMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_pts_for_byte_offset() {
        let mut map = PtsMap::new();
        map.add(100, 1_000_000);
        map.add(200, 2_000_000);
        map.add(150, 3_000_000);

        // Most recent entry (150 bytes @ pts 3) is checked first.
        assert_eq!(map.get(50, false), 3_000_000);
        assert_eq!(map.get(150, false), 3_000_000);
        assert_eq!(map.get(151, false), 2_000_000);
        assert_eq!(map.get(350, false), 2_000_000);
        assert_eq!(map.get(351, false), 1_000_000);
    }

    #[test]
    fn consume_discards_older_entries() {
        let mut map = PtsMap::new();
        map.add(100, 1_000_000);
        map.add(200, 2_000_000);

        assert_eq!(map.get(50, true), 2_000_000);
        // The entry that matched is now exhausted and the older one is gone.
        assert_eq!(map.get(50, false), DVD_NOPTS_VALUE);
    }

    #[test]
    fn flush_clears_everything() {
        let mut map = PtsMap::new();
        map.add(100, 1_000_000);
        map.flush();
        assert!(map.is_empty());
        assert_eq!(map.get(1, false), DVD_NOPTS_VALUE);
    }

    #[test]
    fn offset_past_all_entries_returns_nopts() {
        let mut map = PtsMap::new();
        map.add(10, 1_000_000);
        assert_eq!(map.get(100, false), DVD_NOPTS_VALUE);
    }
}
