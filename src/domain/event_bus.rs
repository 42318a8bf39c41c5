//! Fan-out of [`SessionEvent`]s to presentation observers.
//!
//! The controller publishes one event per observable change. Observers that
//! fall behind lose the oldest events; [`EventStream`] turns that loss into
//! a logged gap so a console or UI can keep rendering.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::SessionEvent;

/// Broadcast bus for [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a bus keeping up to `capacity` undelivered events per
    /// observer. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event` and returns how many observers will see it.
    pub fn publish(&self, event: SessionEvent) -> usize {
        let observers = self.sender.send(event.clone()).unwrap_or(0);
        tracing::trace!(event = event.event_type_str(), observers, "session event");
        observers
    }

    /// Raw receiver of every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Lag-tolerant stream of every event published from now on.
    #[must_use]
    pub fn stream(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
            missed: 0,
        }
    }
}

/// Observer that skips over events it was too slow to receive.
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<SessionEvent>,
    missed: u64,
}

impl EventStream {
    /// Wraps an existing receiver.
    #[must_use]
    pub fn new(receiver: broadcast::Receiver<SessionEvent>) -> Self {
        Self {
            receiver,
            missed: 0,
        }
    }

    /// Next event in publish order, or `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    self.missed += skipped;
                    tracing::warn!(skipped, "session observer lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Total events this observer has lost to lag.
    #[must_use]
    pub fn missed(&self) -> u64 {
        self.missed
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{BalanceSource, Choice};

    fn balance(balance: i64) -> SessionEvent {
        SessionEvent::BalanceChanged {
            balance,
            source: BalanceSource::Authoritative,
        }
    }

    #[test]
    fn publishing_with_no_observers_is_harmless() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(balance(500)), 0);
    }

    #[tokio::test]
    async fn observers_see_a_round_in_publish_order() {
        let bus = EventBus::new(8);
        let mut first = bus.stream();
        let mut second = bus.stream();

        let round = [
            SessionEvent::BetPlaced {
                amount: 10,
                choice: Choice::Odd,
            },
            balance(510),
        ];
        for event in round.clone() {
            assert_eq!(bus.publish(event), 2);
        }

        for stream in [&mut first, &mut second] {
            for expected in &round {
                let Some(event) = stream.next().await else {
                    panic!("bus closed early");
                };
                assert_eq!(&event, expected);
            }
        }
    }

    #[tokio::test]
    async fn slow_observer_skips_to_the_newest_events() {
        let bus = EventBus::new(1);
        let mut slow = bus.stream();

        bus.publish(balance(1));
        bus.publish(balance(2));
        bus.publish(balance(3));

        let Some(event) = slow.next().await else {
            panic!("bus closed early");
        };
        assert_eq!(event, balance(3));
        assert_eq!(slow.missed(), 2);
    }

    #[tokio::test]
    async fn stream_ends_when_the_bus_is_dropped() {
        let bus = EventBus::new(4);
        let mut stream = bus.stream();
        bus.publish(balance(7));
        drop(bus);

        assert_eq!(stream.next().await, Some(balance(7)));
        assert_eq!(stream.next().await, None);
    }
}
