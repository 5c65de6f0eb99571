//! Bounded ranging history log.
//!
//! A fixed-capacity ring buffer of the most recent filtered measurements per
//! anchor, overwritten oldest-first. Offsets count back from the newest
//! entry; the unsigned write index cannot express "nothing logged yet", so
//! an explicit emptiness flag guards the index arithmetic.

use crate::core::constants::RANGING_LOG_CAPACITY;
use crate::ranging::error::LogError;
use crate::ranging::RangingResult;
use crate::utils::clock::Ticks;

/// One history entry: the filtered, corrected result and when it was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangingLogEntry {
    pub result: RangingResult,
    pub timestamp: Ticks,
}

#[derive(Debug, Clone)]
pub struct RangingLog {
    entries: Vec<RangingLogEntry>,
    capacity: usize,
    /// Slot the next entry will be written to.
    next: usize,
    /// Distinguishes a never-written log from a partially filled one.
    has_entries: bool,
}

impl Default for RangingLog {
    fn default() -> Self {
        Self::new(RANGING_LOG_CAPACITY)
    }
}

impl RangingLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            next: 0,
            has_entries: false,
        }
    }

    /// Append an entry, overwriting the oldest once the ring is full.
    pub fn push(&mut self, entry: RangingLogEntry) {
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else {
            self.entries[self.next] = entry;
        }
        self.next = (self.next + 1) % self.capacity;
        self.has_entries = true;
    }

    /// Number of entries currently retrievable.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_entries
    }

    /// Entry `offset` steps back from the most recent one (offset 0 = newest).
    pub fn get(&self, offset: usize) -> Result<RangingLogEntry, LogError> {
        if !self.has_entries {
            return Err(LogError::Empty);
        }
        let available = self.entries.len();
        if offset >= available {
            return Err(LogError::OffsetOutOfRange { offset, available });
        }
        // `next` points one past the newest entry.
        let newest = (self.next + self.capacity - 1) % self.capacity;
        let index = (newest + self.capacity - offset) % self.capacity;
        Ok(self.entries[index])
    }

    /// The most recent entry, if any.
    pub fn latest(&self) -> Option<RangingLogEntry> {
        self.get(0).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(distance_cm: u32, timestamp: Ticks) -> RangingLogEntry {
        RangingLogEntry {
            result: RangingResult {
                distance_cm,
                rssi: -42,
            },
            timestamp,
        }
    }

    #[test]
    fn test_empty_log_is_distinct_error() {
        let log = RangingLog::new(5);
        assert_eq!(log.get(0), Err(LogError::Empty));
        assert!(log.latest().is_none());
    }

    #[test]
    fn test_offset_zero_is_most_recent() {
        let mut log = RangingLog::new(5);
        log.push(entry(100, 1));
        log.push(entry(200, 2));
        assert_eq!(log.get(0).unwrap().result.distance_cm, 200);
        assert_eq!(log.get(1).unwrap().result.distance_cm, 100);
    }

    #[test]
    fn test_offset_past_entries_is_out_of_range() {
        let mut log = RangingLog::new(5);
        log.push(entry(100, 1));
        assert_eq!(
            log.get(1),
            Err(LogError::OffsetOutOfRange {
                offset: 1,
                available: 1
            })
        );
        // Not the same condition as an empty log.
        assert_ne!(log.get(1), Err(LogError::Empty));
    }

    #[test]
    fn test_wraparound_overwrites_oldest() {
        let mut log = RangingLog::new(3);
        for i in 0..5u32 {
            log.push(entry(i * 10, Ticks::from(i)));
        }
        // Entries 20, 30, 40 survive; 40 is newest.
        assert_eq!(log.get(0).unwrap().result.distance_cm, 40);
        assert_eq!(log.get(1).unwrap().result.distance_cm, 30);
        assert_eq!(log.get(2).unwrap().result.distance_cm, 20);
        assert!(log.get(3).is_err());
    }
}
