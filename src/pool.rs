use crate::endpoint::{Endpoint, NodeKey};
use crate::events::{ClusterEvent, EventBus};
use crate::node::{NodeFactory, SingleNodeClient};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Master,
    Slave,
}

/// Which view of the pool a lookup targets (§4.A `nodes(role)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRole {
    All,
    Master,
    Slave,
}

/// Exclusively owned by the [`Pool`]: a single-node client plus the role it
/// currently plays. Destroyed only by `Pool::reset` dropping it, which
/// disconnects the underlying client first.
pub struct NodeHandle<C: SingleNodeClient> {
    pub key: NodeKey,
    pub endpoint: Endpoint,
    pub role: NodeRole,
    pub client: Arc<Mutex<C>>,
}

impl<C: SingleNodeClient> Clone for NodeHandle<C> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            endpoint: self.endpoint.clone(),
            role: self.role,
            client: self.client.clone(),
        }
    }
}

/// Connection Pool (§4.A). Owns one [`SingleNodeClient`] per known endpoint
/// across three views: `all`, `master`, `slave`, with `all = master ∪ slave`
/// and `master ∩ slave = ∅` maintained as an invariant by `reset`.
pub struct Pool<F: NodeFactory> {
    factory: F,
    options: F::Options,
    all: HashMap<NodeKey, NodeHandle<F::Client>>,
    master: HashSet<NodeKey>,
    slave: HashSet<NodeKey>,
    events: EventBus,
}

impl<F: NodeFactory> Pool<F> {
    pub fn new(factory: F, options: F::Options, events: EventBus) -> Self {
        Self {
            factory,
            options,
            all: HashMap::new(),
            master: HashSet::new(),
            slave: HashSet::new(),
            events,
        }
    }

    pub fn nodes(&self, role: PoolRole) -> Vec<NodeHandle<F::Client>> {
        match role {
            PoolRole::All => self.all.values().cloned().collect(),
            PoolRole::Master => self
                .master
                .iter()
                .filter_map(|k| self.all.get(k).cloned())
                .collect(),
            PoolRole::Slave => self
                .slave
                .iter()
                .filter_map(|k| self.all.get(k).cloned())
                .collect(),
        }
    }

    pub fn get(&self, key: &NodeKey) -> Option<NodeHandle<F::Client>> {
        self.all.get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Idempotent: returns the existing handle if present, otherwise
    /// creates one with default role `master` (§4.A `findOrCreate`).
    pub fn find_or_create(&mut self, endpoint: &Endpoint) -> NodeHandle<F::Client> {
        let key = endpoint.key();
        if let Some(existing) = self.all.get(&key) {
            return existing.clone();
        }
        let handle = self.create_handle(endpoint, NodeRole::Master);
        self.master.insert(key.clone());
        self.all.insert(key.clone(), handle.clone());
        self.events.emit(ClusterEvent::NodeAdded(key));
        handle
    }

    fn create_handle(&self, endpoint: &Endpoint, role: NodeRole) -> NodeHandle<F::Client> {
        let client = self.factory.create(endpoint, &self.options);
        NodeHandle {
            key: endpoint.key(),
            endpoint: endpoint.clone(),
            role,
            client: Arc::new(Mutex::new(client)),
        }
    }

    /// Reconciles the pool against a freshly observed endpoint set (as
    /// produced by the refresher, or the empty set on disconnect). Added
    /// endpoints get a `+node`; removed ones are disconnected and get a
    /// `-node`; endpoints present in both but with a changed role are
    /// reclassified in place without churning the underlying client
    /// (§4.A, §9 "shared mutable Controller model").
    pub async fn reset(&mut self, endpoints: &[Endpoint]) {
        let was_non_empty = !self.all.is_empty();
        let wanted: HashMap<NodeKey, &Endpoint> =
            endpoints.iter().map(|e| (e.key(), e)).collect();

        let removed: Vec<NodeKey> = self
            .all
            .keys()
            .filter(|k| !wanted.contains_key(*k))
            .cloned()
            .collect();

        for key in removed {
            if let Some(handle) = self.all.remove(&key) {
                debug!("removing node {key}");
                self.master.remove(&key);
                self.slave.remove(&key);
                handle.client.lock().await.disconnect().await.ok();
                self.events.emit(ClusterEvent::NodeRemoved(key));
            }
        }

        for (key, endpoint) in &wanted {
            let role = if endpoint.read_only {
                NodeRole::Slave
            } else {
                NodeRole::Master
            };

            match self.all.get(key) {
                Some(existing) if existing.role == role => {}
                Some(_) => {
                    // reclassify in place, no churn of the underlying client
                    if let Some(handle) = self.all.get_mut(key) {
                        handle.role = role;
                    }
                    self.master.remove(key);
                    self.slave.remove(key);
                    match role {
                        NodeRole::Master => {
                            self.master.insert(key.clone());
                        }
                        NodeRole::Slave => {
                            self.slave.insert(key.clone());
                        }
                    }
                }
                None => {
                    debug!("adding node {key}");
                    let handle = self.create_handle(endpoint, role);
                    self.all.insert(key.clone(), handle);
                    match role {
                        NodeRole::Master => {
                            self.master.insert(key.clone());
                        }
                        NodeRole::Slave => {
                            self.slave.insert(key.clone());
                        }
                    }
                    self.events.emit(ClusterEvent::NodeAdded(key.clone()));
                }
            }
        }

        if was_non_empty && self.all.is_empty() {
            self.events.emit(ClusterEvent::Drain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeClient, FakeFactory};

    fn events() -> EventBus {
        EventBus::new(64)
    }

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let mut pool = Pool::new(FakeFactory::default(), (), events());
        let e = Endpoint::new("10.0.0.1", 7000);
        let h1 = pool.find_or_create(&e);
        let h2 = pool.find_or_create(&e);
        assert_eq!(h1.key, h2.key);
        assert_eq!(pool.nodes(PoolRole::All).len(), 1);
    }

    #[tokio::test]
    async fn reset_maintains_all_equals_master_union_slave() {
        let mut pool = Pool::<FakeFactory>::new(FakeFactory::default(), (), events());
        let master = Endpoint::new("10.0.0.1", 7000);
        let slave = Endpoint::new("10.0.0.1", 7001).read_only(true);
        pool.reset(&[master.clone(), slave.clone()]).await;

        assert_eq!(pool.nodes(PoolRole::All).len(), 2);
        assert_eq!(pool.nodes(PoolRole::Master).len(), 1);
        assert_eq!(pool.nodes(PoolRole::Slave).len(), 1);

        pool.reset(&[master]).await;
        assert_eq!(pool.nodes(PoolRole::All).len(), 1);
        assert_eq!(pool.nodes(PoolRole::Slave).len(), 0);
    }

    #[tokio::test]
    async fn reset_to_empty_emits_drain() {
        let mut pool = Pool::<FakeFactory>::new(FakeFactory::default(), (), events());
        let mut rx = pool.events.subscribe();
        pool.reset(&[Endpoint::new("10.0.0.1", 7000)]).await;
        pool.reset(&[]).await;

        let mut saw_drain = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ClusterEvent::Drain) {
                saw_drain = true;
            }
        }
        assert!(saw_drain);
    }

    #[tokio::test]
    async fn reset_reclassifies_without_recreating_client() {
        let mut pool = Pool::<FakeFactory>::new(FakeFactory::default(), (), events());
        let endpoint = Endpoint::new("10.0.0.1", 7000);
        pool.reset(&[endpoint.clone()]).await;
        let before = pool.get(&endpoint.key()).unwrap();

        let as_slave = endpoint.clone().read_only(true);
        pool.reset(&[as_slave]).await;
        let after = pool.get(&endpoint.key()).unwrap();

        assert!(Arc::ptr_eq(&before.client, &after.client));
        assert_eq!(after.role, NodeRole::Slave);
    }

    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<NodeHandle<FakeClient>>();
    }
}
