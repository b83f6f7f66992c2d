//! Change bus: fan-out of model deltas to subscribers.
//!
//! The bus is a thin layer over a broadcast channel. Each subscriber has a
//! bounded queue of pending deltas; when a subscriber falls behind, its
//! oldest pending deltas are dropped, the drop is counted, and the
//! subscriber receives a synthetic [`Delta::Resync`] before delivery
//! resumes. Producers never block on slow subscribers.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::delta::Delta;

/// Default per-subscriber queue capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Multi-producer, multi-subscriber delta delivery.
#[derive(Debug)]
pub struct ChangeBus {
    /// Sender for broadcasting deltas.
    sender: broadcast::Sender<Arc<Delta>>,
    /// Per-subscriber queue capacity.
    capacity: usize,
}

impl ChangeBus {
    /// Create a new bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a new bus with the given per-subscriber capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish a delta to all subscribers.
    ///
    /// Returns the number of subscribers that will receive it. Publishing
    /// with no subscribers is not an error.
    pub fn publish(&self, delta: Delta) -> usize {
        let delta = Arc::new(delta);
        trace!(?delta, "publishing delta");
        self.sender.send(delta).unwrap_or(0)
    }

    /// Subscribe to deltas published after this call.
    #[must_use]
    pub fn subscribe(&self) -> DeltaStream {
        DeltaStream {
            receiver: self.sender.subscribe(),
            dropped: 0,
        }
    }

    /// Current number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Per-subscriber queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ChangeBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            capacity: self.capacity,
        }
    }
}

/// One subscriber's view of the delta stream.
pub struct DeltaStream {
    receiver: broadcast::Receiver<Arc<Delta>>,
    dropped: u64,
}

impl DeltaStream {
    /// Receive the next delta.
    ///
    /// Returns `None` once the bus is closed and the queue is drained. If
    /// this subscriber overran its queue, the overrun is recorded in
    /// [`DeltaStream::drop_count`] and a synthetic [`Delta::Resync`] is
    /// returned before normal delivery resumes.
    pub async fn recv(&mut self) -> Option<Arc<Delta>> {
        match self.receiver.recv().await {
            Ok(delta) => Some(delta),
            Err(broadcast::error::RecvError::Lagged(count)) => {
                self.dropped = self.dropped.saturating_add(count);
                warn!(skipped = count, "subscriber overran its delta queue");
                Some(Arc::new(Delta::Resync))
            },
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Receive the next delta without waiting.
    ///
    /// Returns `None` when no delta is queued or the bus is closed. Overrun
    /// handling matches [`DeltaStream::recv`].
    pub fn try_recv(&mut self) -> Option<Arc<Delta>> {
        match self.receiver.try_recv() {
            Ok(delta) => Some(delta),
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                self.dropped = self.dropped.saturating_add(count);
                warn!(skipped = count, "subscriber overran its delta queue");
                Some(Arc::new(Delta::Resync))
            },
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                None
            },
        }
    }

    /// Total deltas dropped for this subscriber since it subscribed.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atoll_core::{SessionId, SessionPhase};

    fn upserted(id: &str, phase: SessionPhase) -> Delta {
        Delta::SessionUpserted {
            session_id: SessionId::new(id),
            phase,
        }
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = ChangeBus::new();
        let mut stream = bus.subscribe();

        let count = bus.publish(upserted("s1", SessionPhase::Idle));
        assert_eq!(count, 1);

        let delta = stream.recv().await.unwrap();
        assert_eq!(delta.session_id().unwrap().as_str(), "s1");
        assert_eq!(stream.drop_count(), 0);
    }

    #[tokio::test]
    async fn test_no_subscribers_is_fine() {
        let bus = ChangeBus::new();
        assert_eq!(bus.publish(Delta::Resync), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_delta_in_order() {
        let bus = ChangeBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(upserted("s1", SessionPhase::Idle));
        bus.publish(upserted("s1", SessionPhase::Processing));
        bus.publish(upserted("s1", SessionPhase::RunningTool));

        for stream in [&mut a, &mut b] {
            let phases: Vec<SessionPhase> = [
                stream.recv().await.unwrap(),
                stream.recv().await.unwrap(),
                stream.recv().await.unwrap(),
            ]
            .iter()
            .map(|d| match **d {
                Delta::SessionUpserted { phase, .. } => phase,
                _ => panic!("expected SessionUpserted"),
            })
            .collect();
            assert_eq!(
                phases,
                vec![
                    SessionPhase::Idle,
                    SessionPhase::Processing,
                    SessionPhase::RunningTool
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_overrun_drops_oldest_and_resyncs() {
        let bus = ChangeBus::with_capacity(4);
        let mut stream = bus.subscribe();

        for i in 0..10 {
            bus.publish(upserted(&format!("s{i}"), SessionPhase::Idle));
        }

        // First receive reports the overrun.
        let first = stream.recv().await.unwrap();
        assert_eq!(*first, Delta::Resync);
        assert_eq!(stream.drop_count(), 6);

        // Delivery resumes with the oldest retained delta.
        let next = stream.recv().await.unwrap();
        assert_eq!(next.session_id().unwrap().as_str(), "s6");
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_bus_dropped() {
        let bus = ChangeBus::new();
        let mut stream = bus.subscribe();
        bus.publish(Delta::Resync);
        drop(bus);

        assert!(stream.recv().await.is_some());
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = ChangeBus::new();
        let mut stream = bus.subscribe();
        assert!(stream.try_recv().is_none());
    }
}
