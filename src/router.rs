use crate::command::{Command, CommandRegistry};
use crate::config::{ClusterConfig, ScaleReads, ScaleReadsPick};
use crate::endpoint::{Endpoint, NodeKey};
use crate::error::{Error, RedisErrorKind};
use crate::events::Status;
use crate::node::{NodeFactory, SingleNodeClient};
use crate::pool::{NodeHandle, Pool, PoolRole};
use crate::queues::{Queues, RetryThunk};
use crate::refresher::Refresher;
use crate::slot_map::SlotMap;
use crate::Result;
use log::debug;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::sync::OnceLock;
use tokio::sync::{mpsc, oneshot, watch, Mutex};

/// Sticks a sequence of `send` calls to the same node — for multi-command
/// sequences, like a transaction, that must not be split across nodes.
/// Written at most once, the first time a command using it is routed; the
/// router never rewrites it afterward, so a `-MOVED`/`-ASK` redirect still
/// plays out for that one retry without moving where later calls on the
/// same pin land.
pub struct PinnedNode {
    node: OnceLock<NodeKey>,
    pub slot: u16,
}

impl PinnedNode {
    pub fn new(slot: u16) -> Self {
        Self {
            node: OnceLock::new(),
            slot,
        }
    }
}

/// Which of the two retry queues a deferred command landed on (§4.D).
#[derive(Debug, Clone, Copy)]
enum QueueKind {
    Failover,
    ClusterDown,
}

enum SelectOutcome<C: SingleNodeClient> {
    Node(NodeHandle<C>),
    Queued,
    Rejected(Error),
}

enum Classification {
    Retry { random: bool, asking: Option<NodeKey> },
    Deferred(QueueKind),
    Fatal(Error),
}

fn is_connection_closed(err: &Error) -> bool {
    matches!(err, Error::Client(msg) if msg == "Connection is closed.")
}

/// Router / Redirection Engine (§4.E). Owns no state of its own beyond what
/// it shares with the other components; every `send` call walks the pool and
/// slot map fresh, so concurrent callers never block on each other except
/// through the locks those components already take.
pub struct Router<F: NodeFactory> {
    pool: Arc<Mutex<Pool<F>>>,
    slot_map: Arc<Mutex<SlotMap>>,
    queues: Arc<Mutex<Queues>>,
    refresher: Arc<Refresher<F>>,
    registry: Arc<dyn CommandRegistry>,
    config: Arc<ClusterConfig>,
    status: watch::Receiver<Status>,
    /// Node currently selected as the pub/sub connection (§4.G), read here
    /// so that SUBSCRIBE-family commands stick to it instead of being routed
    /// by slot.
    subscriber_node: Arc<Mutex<Option<NodeKey>>>,
    /// Raises a background slot-cache refresh after a `-MOVED` reply,
    /// drained by the single task the [`crate::controller::ClusterController`]
    /// owns for this purpose — the router itself never spawns a refresh
    /// task.
    refresh_requests: mpsc::UnboundedSender<()>,
}

impl<F: NodeFactory> Clone for Router<F> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            slot_map: self.slot_map.clone(),
            queues: self.queues.clone(),
            refresher: self.refresher.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            status: self.status.clone(),
            subscriber_node: self.subscriber_node.clone(),
            refresh_requests: self.refresh_requests.clone(),
        }
    }
}

impl<F: NodeFactory> Router<F> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<Mutex<Pool<F>>>,
        slot_map: Arc<Mutex<SlotMap>>,
        queues: Arc<Mutex<Queues>>,
        refresher: Arc<Refresher<F>>,
        registry: Arc<dyn CommandRegistry>,
        config: Arc<ClusterConfig>,
        status: watch::Receiver<Status>,
        subscriber_node: Arc<Mutex<Option<NodeKey>>>,
        refresh_requests: mpsc::UnboundedSender<()>,
    ) -> Self {
        Self {
            pool,
            slot_map,
            queues,
            refresher,
            registry,
            config,
            status,
            subscriber_node,
            refresh_requests,
        }
    }

    /// Routes a single command to a node, following MOVED/ASK redirections
    /// and folding into the shared retry queues on failover/CLUSTERDOWN,
    /// until it succeeds, the per-command redirection budget runs out
    /// (`Error::TooManyRedirections`), or the cluster ends.
    pub async fn send(
        &self,
        command: Arc<dyn Command>,
        pinned: Option<&PinnedNode>,
    ) -> Result<<F::Client as SingleNodeClient>::Response> {
        if *self.status.borrow() == Status::End {
            return Err(Error::closed());
        }

        let mut ttl = self.config.max_redirections;
        let mut random = false;
        let mut asking: Option<NodeKey> = None;

        loop {
            match self
                .try_connection(&*command, pinned, random, asking.take())
                .await
            {
                SelectOutcome::Rejected(e) => return Err(e),
                SelectOutcome::Queued => {
                    self.wait_on_offline_queue().await?;
                    continue;
                }
                SelectOutcome::Node(handle) => {
                    let result = handle.client.lock().await.send_command(&*command).await;
                    match result {
                        Ok(resp) => return Ok(resp),
                        Err(err) => match self.classify(err, &mut ttl).await {
                            Classification::Retry {
                                random: r,
                                asking: a,
                            } => {
                                random = r;
                                asking = a;
                                continue;
                            }
                            Classification::Deferred(kind) => {
                                self.defer(kind).await?;
                                random = true;
                                continue;
                            }
                            Classification::Fatal(e) => return Err(e),
                        },
                    }
                }
            }
        }
    }

    async fn wait_on_offline_queue(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel::<()>();
        let thunk: RetryThunk = Box::new(move || Box::pin(async move { let _ = tx.send(()); }));
        self.queues.lock().await.push_offline(thunk);
        rx.await.map_err(Error::from)
    }

    async fn defer(&self, kind: QueueKind) -> Result<()> {
        let (tx, rx) = oneshot::channel::<()>();
        let thunk: RetryThunk = Box::new(move || Box::pin(async move { let _ = tx.send(()); }));
        let should_arm = match kind {
            QueueKind::Failover => self.queues.lock().await.push_failover(thunk),
            QueueKind::ClusterDown => self.queues.lock().await.push_cluster_down(thunk),
        };
        if should_arm {
            self.arm_timer(kind);
        }
        rx.await.map_err(Error::from)
    }

    /// Spawns the single shared timer for a retry queue: wait the configured
    /// delay, refresh the slot cache once, then drain and re-enter every
    /// thunk queued in the meantime (§4.D, §4.C).
    fn arm_timer(&self, kind: QueueKind) {
        let router = self.clone();
        let delay = match kind {
            QueueKind::Failover => router.config.retry_delay_on_failover,
            QueueKind::ClusterDown => router.config.retry_delay_on_cluster_down,
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = router.refresher.refresh_now().await;
            let batch = match kind {
                QueueKind::Failover => router.queues.lock().await.take_failover(),
                QueueKind::ClusterDown => router.queues.lock().await.take_cluster_down(),
            };
            for thunk in batch {
                thunk().await;
            }
        });
    }

    async fn classify(&self, err: Error, ttl: &mut u32) -> Classification {
        if *ttl == 0 {
            return Classification::Fatal(Error::TooManyRedirections {
                attempts: self.config.max_redirections,
                last_error: err.to_string(),
            });
        }
        *ttl -= 1;

        match &err {
            Error::Redis(redis_err) => match &redis_err.kind {
                RedisErrorKind::Moved {
                    hash_slot,
                    address,
                } => {
                    let endpoint = Endpoint::new(address.0.clone(), address.1);
                    let key = endpoint.key();
                    self.pool.lock().await.find_or_create(&endpoint);
                    self.slot_map.lock().await.set_primary(*hash_slot, key.clone());
                    debug!("MOVED {hash_slot} -> {key}");
                    let _ = self.refresh_requests.send(());
                    Classification::Retry {
                        random: false,
                        asking: None,
                    }
                }
                RedisErrorKind::Ask {
                    hash_slot,
                    address,
                } => {
                    let endpoint = Endpoint::new(address.0.clone(), address.1);
                    let key = endpoint.key();
                    self.pool.lock().await.find_or_create(&endpoint);
                    debug!("ASK {hash_slot} -> {key}");
                    Classification::Retry {
                        random: false,
                        asking: Some(key),
                    }
                }
                RedisErrorKind::ClusterDown
                    if !self.config.retry_delay_on_cluster_down.is_zero() =>
                {
                    Classification::Deferred(QueueKind::ClusterDown)
                }
                _ => Classification::Fatal(err),
            },
            _ if is_connection_closed(&err) && !self.config.retry_delay_on_failover.is_zero() => {
                Classification::Deferred(QueueKind::Failover)
            }
            _ => Classification::Fatal(err),
        }
    }

    /// Picks the node a command should be sent to, or reports that it must
    /// wait for (or be rejected by) the offline queue (§4.E `tryConnection`).
    async fn try_connection(
        &self,
        command: &dyn Command,
        pinned: Option<&PinnedNode>,
        random: bool,
        asking: Option<NodeKey>,
    ) -> SelectOutcome<F::Client> {
        let status = *self.status.borrow();
        if status == Status::End {
            return SelectOutcome::Rejected(Error::ended());
        }
        if status != Status::Ready {
            return if self.config.enable_offline_queue {
                SelectOutcome::Queued
            } else {
                SelectOutcome::Rejected(Error::offline_queue_disabled())
            };
        }

        // An ASK override is a one-shot for this specific retry and takes
        // priority over a pin: the pin may still point at the node that
        // just replied `-ASK`, and retrying there would loop forever. A
        // cached pin otherwise wins over subscriber-mode routing below.
        if asking.is_none() {
            if let Some(p) = pinned {
                if let Some(key) = p.node.get() {
                    if let Some(handle) = self.pool.lock().await.get(key) {
                        return SelectOutcome::Node(handle);
                    }
                }
            }
        }

        if self.registry.enters_subscriber_mode(command.name())
            || self.registry.exits_subscriber_mode(command.name())
        {
            if let Some(key) = self.subscriber_node.lock().await.clone() {
                if let Some(handle) = self.pool.lock().await.get(&key) {
                    return SelectOutcome::Node(handle);
                }
            }
        }

        let target_slot = pinned.map(|p| p.slot).or_else(|| command.slot());
        let readonly = self.registry.is_readonly(command.name());

        let mut chosen: Option<NodeKey> = None;
        if !random {
            if let Some(slot) = target_slot {
                let slot_map = self.slot_map.lock().await;
                if let Some(keys) = slot_map.get(slot) {
                    chosen = self.pick_from_slot(keys, readonly);
                }
            }
        }

        let is_asking = asking.is_some();
        if let Some(ask_key) = asking {
            chosen = Some(ask_key);
        }

        let handle = match &chosen {
            Some(key) => self.pool.lock().await.get(key),
            None => None,
        };

        let handle = match handle {
            Some(h) => Some(h),
            None => self.pick_random_node(readonly).await,
        };

        match handle {
            Some(h) => {
                if let Some(p) = pinned {
                    let _ = p.node.get_or_init(|| h.key.clone());
                }
                if is_asking {
                    h.client.lock().await.asking();
                }
                SelectOutcome::Node(h)
            }
            None if self.config.enable_offline_queue => SelectOutcome::Queued,
            None => SelectOutcome::Rejected(Error::no_startup_nodes()),
        }
    }

    fn pick_from_slot(&self, keys: &[NodeKey], readonly: bool) -> Option<NodeKey> {
        if keys.is_empty() {
            return None;
        }
        if !readonly {
            return keys.first().cloned();
        }
        match &self.config.scale_reads {
            ScaleReads::Master => keys.first().cloned(),
            ScaleReads::All => keys.choose(&mut rand::rng()).cloned(),
            ScaleReads::Slave => {
                if keys.len() > 1 {
                    keys[1..].choose(&mut rand::rng()).cloned()
                } else {
                    keys.first().cloned()
                }
            }
            ScaleReads::Custom(selector) => match selector(keys) {
                ScaleReadsPick::One(key) => Some(key),
                ScaleReadsPick::Sample(candidates) => candidates.choose(&mut rand::rng()).cloned(),
                ScaleReadsPick::Default => keys.first().cloned(),
            },
        }
    }

    async fn pick_random_node(&self, readonly: bool) -> Option<NodeHandle<F::Client>> {
        let pool = self.pool.lock().await;
        let role = if readonly {
            match &self.config.scale_reads {
                ScaleReads::Master => PoolRole::Master,
                _ => PoolRole::All,
            }
        } else {
            PoolRole::Master
        };
        let nodes = pool.nodes(role);
        nodes
            .choose(&mut rand::rng())
            .cloned()
            .or_else(|| pool.nodes(PoolRole::All).choose(&mut rand::rng()).cloned())
    }
}
