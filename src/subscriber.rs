use crate::endpoint::NodeKey;
use crate::error::Error;
use crate::events::{ClusterEvent, EventBus};
use crate::node::{NodeFactory, SingleNodeClient, SubscriptionSnapshot};
use crate::pool::{NodeHandle, Pool, PoolRole};
use crate::Result;
use log::debug;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Subscriber Selector (§4.G): picks one pool member to carry all pub/sub
/// traffic, and moves that role to a freshly selected node when the current
/// one drops out of the pool. Channels and patterns are tracked locally
/// (rather than re-read from the departing node, which may already be
/// disconnected by the time [`Self::handle_event`] observes its removal) so
/// a reselect can always replay the full subscription set.
pub struct Subscriber<F: NodeFactory> {
    pool: Arc<Mutex<Pool<F>>>,
    subscriber_node: Arc<Mutex<Option<NodeKey>>>,
    snapshot: Mutex<SubscriptionSnapshot>,
    events: EventBus,
}

impl<F: NodeFactory> Subscriber<F> {
    pub fn new(
        pool: Arc<Mutex<Pool<F>>>,
        subscriber_node: Arc<Mutex<Option<NodeKey>>>,
        events: EventBus,
    ) -> Self {
        Self {
            pool,
            subscriber_node,
            snapshot: Mutex::new(SubscriptionSnapshot::default()),
            events,
        }
    }

    pub async fn current_node(&self) -> Option<NodeKey> {
        self.subscriber_node.lock().await.clone()
    }

    pub async fn snapshot(&self) -> SubscriptionSnapshot {
        self.snapshot.lock().await.clone()
    }

    /// Subscribes the selected node (choosing one first if needed) to the
    /// given channels, and folds them into the locally tracked snapshot.
    pub async fn subscribe(&self, channels: &[String]) -> Result<()> {
        let handle = self
            .ensure_selected()
            .await
            .ok_or_else(Error::no_startup_nodes)?;
        handle.client.lock().await.subscribe(channels).await?;
        let mut snapshot = self.snapshot.lock().await;
        for channel in channels {
            if !snapshot.channels.contains(channel) {
                snapshot.channels.push(channel.clone());
            }
        }
        Ok(())
    }

    pub async fn psubscribe(&self, patterns: &[String]) -> Result<()> {
        let handle = self
            .ensure_selected()
            .await
            .ok_or_else(Error::no_startup_nodes)?;
        handle.client.lock().await.psubscribe(patterns).await?;
        let mut snapshot = self.snapshot.lock().await;
        for pattern in patterns {
            if !snapshot.patterns.contains(pattern) {
                snapshot.patterns.push(pattern.clone());
            }
        }
        Ok(())
    }

    async fn ensure_selected(&self) -> Option<NodeHandle<F::Client>> {
        if let Some(key) = self.subscriber_node.lock().await.clone() {
            if let Some(handle) = self.pool.lock().await.get(&key) {
                return Some(handle);
            }
        }
        self.select_new().await
    }

    /// Picks a random pool member and replays whatever was previously
    /// subscribed onto it.
    async fn select_new(&self) -> Option<NodeHandle<F::Client>> {
        let handle = {
            let pool = self.pool.lock().await;
            pool.nodes(PoolRole::All).choose(&mut rand::rng()).cloned()
        }?;
        *self.subscriber_node.lock().await = Some(handle.key.clone());
        debug!("selected {} as the pub/sub connection", handle.key);

        let snapshot = self.snapshot.lock().await.clone();
        if !snapshot.channels.is_empty() {
            let _ = handle.client.lock().await.subscribe(&snapshot.channels).await;
        }
        if !snapshot.patterns.is_empty() {
            let _ = handle
                .client
                .lock()
                .await
                .psubscribe(&snapshot.patterns)
                .await;
        }
        Some(handle)
    }

    /// Call on every emitted [`ClusterEvent`]; reselects when the node
    /// currently serving pub/sub drops out of the pool.
    pub async fn handle_event(&self, event: &ClusterEvent) {
        if let ClusterEvent::NodeRemoved(key) = event {
            let mut current = self.subscriber_node.lock().await;
            if current.as_ref() == Some(key) {
                *current = None;
                drop(current);
                self.select_new().await;
            }
        }
    }

    /// Spawns a task that listens on the shared event bus and drives
    /// [`Self::handle_event`] for as long as `self` (held in `subscriber`)
    /// is alive.
    pub fn spawn_event_listener(subscriber: Arc<Self>) {
        let mut rx = subscriber.events.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                subscriber.handle_event(&event).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::events::EventBus;
    use crate::test_support::FakeFactory;

    async fn make_subscriber(
        endpoints: Vec<Endpoint>,
    ) -> (Subscriber<FakeFactory>, Arc<Mutex<Pool<FakeFactory>>>) {
        let events = EventBus::new(64);
        let factory = FakeFactory::default();
        let mut pool = Pool::new(factory, (), events.clone());
        pool.reset(&endpoints).await;
        let pool = Arc::new(Mutex::new(pool));
        let subscriber_node = Arc::new(Mutex::new(None));
        (Subscriber::new(pool.clone(), subscriber_node, events), pool)
    }

    #[tokio::test]
    async fn subscribe_selects_a_node_and_tracks_channels() {
        let (subscriber, pool) = make_subscriber(vec![Endpoint::new("10.0.0.1", 7000)]).await;
        subscriber
            .subscribe(&["a".to_owned(), "b".to_owned()])
            .await
            .unwrap();

        let key = subscriber.current_node().await.unwrap();
        let handle = pool.lock().await.get(&key).unwrap();
        let wire_snapshot = handle.client.lock().await.snapshot_subscriptions();
        assert_eq!(wire_snapshot.channels, vec!["a", "b"]);
        assert_eq!(subscriber.snapshot().await.channels, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn resubscribing_reuses_the_same_node() {
        let (subscriber, _pool) = make_subscriber(vec![Endpoint::new("10.0.0.1", 7000)]).await;
        subscriber.subscribe(&["a".to_owned()]).await.unwrap();
        let first = subscriber.current_node().await.unwrap();
        subscriber.subscribe(&["b".to_owned()]).await.unwrap();
        let second = subscriber.current_node().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn node_removal_moves_subscriptions_to_a_fresh_node() {
        let a = Endpoint::new("10.0.0.1", 7000);
        let b = Endpoint::new("10.0.0.2", 7000);
        let (subscriber, pool) = make_subscriber(vec![a.clone()]).await;
        subscriber
            .subscribe(&["a".to_owned(), "b".to_owned()])
            .await
            .unwrap();
        assert_eq!(subscriber.current_node().await.unwrap(), a.key());

        pool.lock().await.reset(&[b.clone()]).await;
        subscriber
            .handle_event(&ClusterEvent::NodeRemoved(a.key()))
            .await;

        let new_key = subscriber.current_node().await.unwrap();
        assert_eq!(new_key, b.key());
        let handle = pool.lock().await.get(&new_key).unwrap();
        let wire_snapshot = handle.client.lock().await.snapshot_subscriptions();
        assert_eq!(wire_snapshot.channels, vec!["a", "b"]);
    }
}
