use crate::endpoint::NodeKey;
use tokio::sync::broadcast;

/// Cluster lifecycle status (§3, §4.F). Transitions are always emitted in
/// the order they're set; delivery is asynchronous ("next tick", §9) via
/// the broadcast channel below rather than inline callback invocation, so a
/// listener registered immediately after the triggering call still
/// observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Wait,
    Connecting,
    Connect,
    Ready,
    Reconnecting,
    Close,
    End,
}

/// Everything the cluster core emits (§6 "Emitted events", plus status
/// transitions).
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    Status(Status),
    NodeAdded(NodeKey),
    NodeRemoved(NodeKey),
    NodeError { node: NodeKey, error: String },
    /// Pool became empty after having been non-empty (§4.A).
    Drain,
    /// A slot-cache refresh completed successfully (§4.C step 3).
    Refresh,
    Message { channel: String, payload: Vec<u8> },
    MessageBuffer { channel: String, payload: Vec<u8> },
    PMessage { pattern: String, channel: String, payload: Vec<u8> },
    PMessageBuffer { pattern: String, channel: String, payload: Vec<u8> },
}

/// Thin wrapper around a broadcast channel: the single place events are
/// published from, and the handle callers subscribe through.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClusterEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.sender.subscribe()
    }

    /// Publishing never fails for lack of subscribers; a dropped event with
    /// nobody listening is not an error condition here.
    pub fn emit(&self, event: ClusterEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_registered_after_emit_misses_it_but_live_ones_see_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(ClusterEvent::Status(Status::Connecting));
        bus.emit(ClusterEvent::Status(Status::Connect));
        bus.emit(ClusterEvent::Status(Status::Ready));

        let mut seen = Vec::new();
        for _ in 0..3 {
            if let Ok(ClusterEvent::Status(s)) = rx.recv().await {
                seen.push(s);
            }
        }
        assert_eq!(
            seen,
            vec![Status::Connecting, Status::Connect, Status::Ready]
        );
    }
}
