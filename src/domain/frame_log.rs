//! Append-only capture of every frame exchanged with the server.
//!
//! [`FrameLog`] records unconditionally. Whether anything is currently
//! displaying the log is a presentation concern: observers get a
//! [`tokio::sync::broadcast`] receiver of [`FrameLogEvent`]s and no way to
//! mutate the log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Direction of a logged frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Client → server.
    Sent,
    /// Server → client.
    Received,
}

/// One captured frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameLogEntry {
    /// Position in the log, monotonic across clears.
    pub sequence: u64,
    /// Which way the frame travelled.
    pub direction: Direction,
    /// Raw frame text, exactly as sent or received.
    pub payload: String,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
}

/// Change notification published by [`FrameLog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FrameLogEvent {
    /// A frame was appended.
    Appended(FrameLogEntry),
    /// The log was emptied.
    Cleared,
}

/// Append-only frame log with change notifications.
#[derive(Debug)]
pub struct FrameLog {
    entries: Vec<FrameLogEntry>,
    next_sequence: u64,
    sender: broadcast::Sender<FrameLogEvent>,
}

impl FrameLog {
    /// Creates an empty log whose notification channel buffers up to
    /// `channel_capacity` events per lagging observer.
    #[must_use]
    pub fn new(channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            entries: Vec::new(),
            next_sequence: 0,
            sender,
        }
    }

    /// Appends a frame and notifies observers. Returns its sequence number.
    pub fn record(&mut self, direction: Direction, payload: impl Into<String>) -> u64 {
        let entry = FrameLogEntry {
            sequence: self.next_sequence,
            direction,
            payload: payload.into(),
            timestamp: Utc::now(),
        };
        self.next_sequence += 1;
        tracing::debug!(
            seq = entry.sequence,
            direction = ?entry.direction,
            payload = %entry.payload,
            "frame"
        );
        let sequence = entry.sequence;
        let _ = self.sender.send(FrameLogEvent::Appended(entry.clone()));
        self.entries.push(entry);
        sequence
    }

    /// Empties the log and notifies observers.
    pub fn clear(&mut self) {
        self.entries.clear();
        let _ = self.sender.send(FrameLogEvent::Cleared);
    }

    /// Captured frames, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[FrameLogEntry] {
        &self.entries
    }

    /// Number of captured frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frames captured in the given direction, oldest first.
    pub fn in_direction(&self, direction: Direction) -> impl Iterator<Item = &FrameLogEntry> + '_ {
        self.entries
            .iter()
            .filter(move |entry| entry.direction == direction)
    }

    /// Creates a receiver for all future [`FrameLogEvent`]s.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FrameLogEvent> {
        self.sender.subscribe()
    }

    /// Returns a subscription-only handle that outlives borrows of the log.
    #[must_use]
    pub fn tap(&self) -> FrameTap {
        FrameTap {
            sender: self.sender.clone(),
        }
    }
}

/// Subscription point for frame log changes. Cannot publish or mutate.
#[derive(Debug, Clone)]
pub struct FrameTap {
    sender: broadcast::Sender<FrameLogEvent>,
}

impl FrameTap {
    /// Creates a receiver for all future [`FrameLogEvent`]s.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FrameLogEvent> {
        self.sender.subscribe()
    }
}

impl Default for FrameLog {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn records_without_observers() {
        let mut log = FrameLog::new(8);
        log.record(Direction::Sent, r#"{"kind":"AUTH"}"#);
        log.record(Direction::Received, "not json");
        assert_eq!(log.len(), 2);
        assert_eq!(log.in_direction(Direction::Received).count(), 1);
        let sequences: Vec<u64> = log.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
    }

    #[test]
    fn clear_empties_but_keeps_sequence() {
        let mut log = FrameLog::new(8);
        log.record(Direction::Sent, "a");
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.record(Direction::Sent, "b"), 1);
    }

    #[tokio::test]
    async fn observers_receive_appends_and_clears() {
        let mut log = FrameLog::new(8);
        let mut rx = log.subscribe();

        log.record(Direction::Received, "payload");
        log.clear();

        let Ok(FrameLogEvent::Appended(entry)) = rx.recv().await else {
            panic!("expected append event");
        };
        assert_eq!(entry.payload, "payload");
        assert_eq!(entry.direction, Direction::Received);

        let Ok(FrameLogEvent::Cleared) = rx.recv().await else {
            panic!("expected clear event");
        };
    }

    #[tokio::test]
    async fn tap_subscribers_see_appends() {
        let mut log = FrameLog::new(8);
        let tap = log.tap();
        let mut rx = tap.subscribe();
        log.record(Direction::Sent, "x");
        let Ok(FrameLogEvent::Appended(entry)) = rx.recv().await else {
            panic!("expected append event");
        };
        assert_eq!(entry.sequence, 0);
    }
}
