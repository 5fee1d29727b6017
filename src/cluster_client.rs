use crate::command::{Command, CommandRegistry};
use crate::config::IntoClusterConfig;
use crate::controller::ClusterController;
use crate::endpoint::NodeKey;
use crate::events::{ClusterEvent, Status};
use crate::node::{NodeFactory, SingleNodeClient};
use crate::router::{PinnedNode, Router};
use crate::subscriber::Subscriber;
use crate::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Top-level entry point: wires the controller, router and subscriber
/// together over one shared pool/slot-map/queues set (§2 System Overview).
/// Cloning is cheap — every field is `Arc`-backed and shares the same
/// underlying cluster state through a single inner actor.
pub struct ClusterClient<F: NodeFactory> {
    controller: Arc<ClusterController<F>>,
    router: Router<F>,
    subscriber: Arc<Subscriber<F>>,
}

impl<F: NodeFactory> Clone for ClusterClient<F> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            router: self.router.clone(),
            subscriber: self.subscriber.clone(),
        }
    }
}

impl<F: NodeFactory> ClusterClient<F> {
    pub fn new(
        config: impl IntoClusterConfig,
        factory: F,
        options: F::Options,
        registry: Arc<dyn CommandRegistry>,
    ) -> Result<Self> {
        let config = config.into_cluster_config()?;
        let controller = Arc::new(ClusterController::new(config, factory, options));
        let subscriber_node: Arc<Mutex<Option<NodeKey>>> = Arc::new(Mutex::new(None));

        let router = Router::new(
            controller.pool(),
            controller.slot_map(),
            controller.queues(),
            controller.refresher(),
            registry,
            controller.config(),
            controller.status_receiver(),
            subscriber_node.clone(),
            controller.refresh_requests(),
        );

        let subscriber = Arc::new(Subscriber::new(
            controller.pool(),
            subscriber_node,
            controller.events(),
        ));
        Subscriber::spawn_event_listener(subscriber.clone());

        Ok(Self {
            controller,
            router,
            subscriber,
        })
    }

    /// Connects to the cluster, retrying with the configured backoff
    /// strategy until `ready` or the strategy gives up.
    pub async fn connect(&self) -> Result<()> {
        self.controller.run_with_retry().await
    }

    /// Disconnects every node without attempting to reconnect.
    pub async fn disconnect(&self) -> Result<()> {
        self.controller.disconnect(false).await
    }

    pub fn status(&self) -> Status {
        self.controller.status()
    }

    pub fn events(&self) -> broadcast::Receiver<ClusterEvent> {
        self.controller.subscribe_events()
    }

    /// Routes a single command through the cluster (§4.E), following
    /// redirections until it succeeds or the redirection budget runs out.
    pub async fn send(
        &self,
        command: Arc<dyn Command>,
    ) -> Result<<F::Client as SingleNodeClient>::Response> {
        self.router.send(command, None).await
    }

    /// Like [`Self::send`], but reuses (and, on first use, populates) a
    /// caller-held [`PinnedNode`] so every command sharing it lands on the
    /// same node.
    pub async fn send_pinned(
        &self,
        command: Arc<dyn Command>,
        pinned: &PinnedNode,
    ) -> Result<<F::Client as SingleNodeClient>::Response> {
        self.router.send(command, Some(pinned)).await
    }

    pub async fn subscribe(&self, channels: &[String]) -> Result<()> {
        self.subscriber.subscribe(channels).await
    }

    pub async fn psubscribe(&self, patterns: &[String]) -> Result<()> {
        self.subscriber.psubscribe(patterns).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{SimpleCommand, StaticCommandRegistry};
    use crate::endpoint::Endpoint;
    use crate::node::SlotRangeReply;
    use crate::test_support::{FakeFactory, FakeOutcome};
    use crate::ClusterConfig;

    #[tokio::test]
    async fn connect_then_send_round_trips_through_the_router() {
        let factory = FakeFactory::default();
        factory.topology.set_slots(vec![SlotRangeReply {
            slot_start: 0,
            slot_end: 16383,
            endpoints: vec![Endpoint::new("10.0.0.1", 7000)],
        }]);
        factory
            .topology
            .push_outcome("10.0.0.1:7000", FakeOutcome::Ok(b"PONG".to_vec()));

        let config =
            ClusterConfig::default().with_startup_nodes(vec![Endpoint::new("10.0.0.1", 7000)]);
        let client = ClusterClient::new(
            config,
            factory,
            (),
            Arc::new(StaticCommandRegistry::with_defaults()),
        )
        .unwrap();

        client.connect().await.unwrap();
        assert_eq!(client.status(), Status::Ready);

        let resp = client
            .send(Arc::new(SimpleCommand::new("PING", Some(0))))
            .await
            .unwrap();
        assert_eq!(resp, b"PONG".to_vec());
    }

    #[tokio::test]
    async fn subscribe_before_connect_still_selects_a_node_once_present() {
        let factory = FakeFactory::default();
        factory.topology.set_slots(vec![SlotRangeReply {
            slot_start: 0,
            slot_end: 16383,
            endpoints: vec![Endpoint::new("10.0.0.1", 7000)],
        }]);
        let config =
            ClusterConfig::default().with_startup_nodes(vec![Endpoint::new("10.0.0.1", 7000)]);
        let client = ClusterClient::new(
            config,
            factory,
            (),
            Arc::new(StaticCommandRegistry::with_defaults()),
        )
        .unwrap();
        client.connect().await.unwrap();

        client.subscribe(&["news".to_owned()]).await.unwrap();
        assert!(client.subscriber.current_node().await.is_some());
    }
}
