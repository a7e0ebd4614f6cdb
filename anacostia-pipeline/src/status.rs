//! Status fan-out
//!
//! Every lifecycle transition is published here and multiplexed to SSE
//! clients by the API layer. The bus is observability only: lagging or
//! absent receivers never block or fail the engine.

use anacostia_core::dto::status::StatusUpdate;
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 256;

/// In-process broadcast channel for node status updates
#[derive(Debug, Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<StatusUpdate>,
}

impl StatusBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish a status update
    ///
    /// A send with no subscribers is not an error.
    pub fn publish(&self, update: StatusUpdate) {
        let _ = self.tx.send(update);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anacostia_core::domain::node::{NodeId, NodeStatus};

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = StatusBus::new();
        bus.publish(StatusUpdate::new(
            NodeId::new("p", "n"),
            NodeStatus::Executing,
            Some(1),
        ));
    }

    #[tokio::test]
    async fn test_subscriber_sees_updates_in_order() {
        let bus = StatusBus::new();
        let mut rx = bus.subscribe();

        let id = NodeId::new("p", "n");
        bus.publish(StatusUpdate::new(id.clone(), NodeStatus::Queued, Some(1)));
        bus.publish(StatusUpdate::new(id.clone(), NodeStatus::Executing, Some(1)));

        assert_eq!(rx.recv().await.unwrap().status, NodeStatus::Queued);
        assert_eq!(rx.recv().await.unwrap().status, NodeStatus::Executing);
    }
}
