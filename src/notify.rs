//! Change notifications.
//!
//! The manager publishes one event per successful mutation. Delivery is
//! fire-and-forget and never blocks the storage operation.

use serde::Serialize;
use tokio::sync::broadcast;

// == Change Event ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Set,
    Remove,
    Clear,
}

/// Where a mutation came from. Sync-applied writes are tagged so the sync
/// path can ignore its own echoes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    #[default]
    Local,
    Sync,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub namespace: String,
    /// Logical key; None for namespace-wide operations
    pub key: Option<String>,
    pub operation: ChangeOperation,
    pub origin: ChangeOrigin,
}

/// Sink for change events.
pub trait ChangeNotifier: Send + Sync + std::fmt::Debug {
    fn publish(&self, event: ChangeEvent);
}

// == Broadcast Notifier ==
/// Publishes onto a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ChangeEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn publish(&self, event: ChangeEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ChangeEvent {
        ChangeEvent {
            namespace: "app".into(),
            key: Some("k".into()),
            operation: ChangeOperation::Set,
            origin: ChangeOrigin::Local,
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.publish(event());
        assert_eq!(rx.recv().await.unwrap(), event());
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        BroadcastNotifier::new(1).publish(event());
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["operation"], "set");
        assert_eq!(json["origin"], "local");
    }
}
