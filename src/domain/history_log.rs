//! Bounded, newest-first record of resolved rounds.

use std::collections::VecDeque;

use serde::Serialize;

use super::bet::{RollOutcome, RoundResult};

/// Default number of rounds kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// One resolved round. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    roll: u8,
    result: RoundResult,
    magnitude: i64,
}

impl HistoryEntry {
    /// Builds an entry from a server outcome and the amount at stake.
    #[must_use]
    pub const fn new(outcome: RollOutcome, amount: i64) -> Self {
        Self {
            roll: outcome.roll(),
            result: outcome.result(),
            magnitude: amount.abs(),
        }
    }

    /// Die face.
    #[must_use]
    pub const fn roll(&self) -> u8 {
        self.roll
    }

    /// Verdict.
    #[must_use]
    pub const fn result(&self) -> RoundResult {
        self.result
    }

    /// Absolute point delta.
    #[must_use]
    pub const fn magnitude(&self) -> i64 {
        self.magnitude
    }
}

/// Ring buffer of [`HistoryEntry`], newest first.
///
/// When full, pushing evicts the oldest entry. A capacity of zero keeps
/// nothing.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryLog {
    /// Creates an empty log holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepends `entry`, evicting from the back when over capacity.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }

    /// Most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no round has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(roll: i64, magnitude: i64) -> HistoryEntry {
        let Ok(outcome) = RollOutcome::new(roll, RoundResult::Win) else {
            panic!("valid roll");
        };
        HistoryEntry::new(outcome, magnitude)
    }

    #[test]
    fn newest_first() {
        let mut log = HistoryLog::new(3);
        log.push(entry(1, 10));
        log.push(entry(2, 20));
        let rolls: Vec<u8> = log.entries().map(HistoryEntry::roll).collect();
        assert_eq!(rolls, vec![2, 1]);
        assert_eq!(log.latest().map(HistoryEntry::magnitude), Some(20));
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut log = HistoryLog::new(2);
        log.push(entry(1, 1));
        log.push(entry(2, 2));
        log.push(entry(3, 3));
        let rolls: Vec<u8> = log.entries().map(HistoryEntry::roll).collect();
        assert_eq!(rolls, vec![3, 2]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut log = HistoryLog::new(0);
        log.push(entry(4, 5));
        assert!(log.is_empty());
    }

    #[test]
    fn magnitude_is_absolute() {
        assert_eq!(entry(5, -40).magnitude(), 40);
    }

    #[test]
    fn default_capacity_is_twenty() {
        assert_eq!(HistoryLog::default().capacity(), 20);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(capacity in 0usize..32, pushes in 0usize..100) {
            let mut log = HistoryLog::new(capacity);
            for i in 0..pushes {
                let magnitude = i64::try_from(i).unwrap_or_default();
                log.push(entry(1, magnitude));
                prop_assert!(log.len() <= capacity);
            }
            prop_assert_eq!(log.len(), pushes.min(capacity));
            // Newest first: magnitudes strictly decrease from the front.
            let magnitudes: Vec<i64> = log.entries().map(HistoryEntry::magnitude).collect();
            prop_assert!(magnitudes.windows(2).all(|w| w.first() > w.get(1)));
        }
    }
}
