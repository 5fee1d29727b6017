use crate::config::ClusterConfig;
use crate::events::{ClusterEvent, EventBus, Status};
use crate::node::NodeFactory;
use crate::pool::Pool;
use crate::queues::Queues;
use crate::refresher::Refresher;
use crate::slot_map::SlotMap;
use crate::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};

/// Tracks reconnect attempts against the configured [`ClusterRetryStrategy`](crate::config::ClusterRetryStrategy).
struct RetryState {
    attempts: u32,
}

impl RetryState {
    fn new() -> Self {
        Self { attempts: 0 }
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn next_delay(&mut self, config: &ClusterConfig) -> Option<std::time::Duration> {
        self.attempts += 1;
        config.retry_strategy.next_delay(self.attempts)
    }
}

/// Cluster Controller (§4.F): owns the cluster-wide [`Status`] state machine
/// and drives the initial connect, reconnect-with-backoff, and graceful
/// shutdown paths. The pool, slot map, queues and refresher it coordinates
/// are shared with the [`crate::router::Router`] and
/// [`crate::subscriber::Subscriber`] built on top of the same handles.
pub struct ClusterController<F: NodeFactory> {
    pool: Arc<Mutex<Pool<F>>>,
    slot_map: Arc<Mutex<SlotMap>>,
    queues: Arc<Mutex<Queues>>,
    refresher: Arc<Refresher<F>>,
    events: EventBus,
    config: Arc<ClusterConfig>,
    status_tx: watch::Sender<Status>,
    status_rx: watch::Receiver<Status>,
    retry: Mutex<RetryState>,
    refresh_requests: mpsc::UnboundedSender<()>,
}

impl<F: NodeFactory> ClusterController<F> {
    pub fn new(config: ClusterConfig, factory: F, options: F::Options) -> Self {
        let events = EventBus::default();
        let pool = Arc::new(Mutex::new(Pool::new(factory, options, events.clone())));
        let slot_map = Arc::new(Mutex::new(SlotMap::new()));
        let refresher = Arc::new(Refresher::new(
            pool.clone(),
            slot_map.clone(),
            events.clone(),
            config.refresh_node_timeout,
        ));
        let (status_tx, status_rx) = watch::channel(Status::Wait);

        // Single long-lived task that drains refresh requests raised by the
        // router's redirection classifier: a `-MOVED` reply asks for a
        // background slot-cache walk without blocking the command that
        // observed it, but every such request funnels through this one task
        // rather than each one spawning its own.
        let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel::<()>();
        let background_refresher = refresher.clone();
        tokio::spawn(async move {
            while refresh_rx.recv().await.is_some() {
                let _ = background_refresher.refresh_now().await;
            }
        });

        Self {
            pool,
            slot_map,
            queues: Arc::new(Mutex::new(Queues::new())),
            refresher,
            events,
            config: Arc::new(config),
            status_tx,
            status_rx,
            retry: Mutex::new(RetryState::new()),
            refresh_requests: refresh_tx,
        }
    }

    pub fn pool(&self) -> Arc<Mutex<Pool<F>>> {
        self.pool.clone()
    }

    pub fn slot_map(&self) -> Arc<Mutex<SlotMap>> {
        self.slot_map.clone()
    }

    pub fn queues(&self) -> Arc<Mutex<Queues>> {
        self.queues.clone()
    }

    pub fn refresher(&self) -> Arc<Refresher<F>> {
        self.refresher.clone()
    }

    pub fn config(&self) -> Arc<ClusterConfig> {
        self.config.clone()
    }

    pub fn status(&self) -> Status {
        *self.status_rx.borrow()
    }

    /// A read-only view of the status, for components (router, subscriber)
    /// that only need to observe the current value.
    pub fn status_receiver(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Sender half handed to the [`crate::router::Router`] so it can request
    /// a background slot-cache refresh without spawning its own task.
    pub fn refresh_requests(&self) -> mpsc::UnboundedSender<()> {
        self.refresh_requests.clone()
    }

    fn set_status(&self, status: Status) {
        info!("cluster status -> {status:?}");
        let _ = self.status_tx.send(status);
        self.events.emit(ClusterEvent::Status(status));
    }

    /// First connection attempt: populates the pool with the startup nodes
    /// and performs an initial slot-cache walk. On success the cluster moves
    /// through `connect` to `ready`, and the offline queue (anything
    /// submitted while `wait`/`connecting`) is drained. On failure the pool
    /// drains back to empty, status moves to `close`, and the caller decides
    /// whether to retry via [`Self::run_with_retry`] or give up.
    pub async fn connect(&self) -> Result<()> {
        if self.config.startup_nodes.is_empty() {
            return Err(crate::Error::no_startup_nodes());
        }
        self.set_status(Status::Connecting);
        self.pool.lock().await.reset(&self.config.startup_nodes).await;

        match self.refresher.refresh_now().await {
            Ok(()) => {
                self.set_status(Status::Connect);
                self.set_status(Status::Ready);
                self.retry.lock().await.reset();
                self.drain_offline_queue().await;
                Ok(())
            }
            Err(e) => {
                warn!("initial connect failed: {e}");
                self.pool.lock().await.reset(&[]).await;
                self.set_status(Status::Close);
                Err(e)
            }
        }
    }

    /// Connects, retrying with the configured backoff strategy until it
    /// succeeds or the strategy gives up (§4.F `reconnecting` → `timer` →
    /// `connect` loop). On giveup the cluster transitions to `end` and every
    /// queued command across all three queues is woken up (§4.D): the
    /// router re-checks status and rejects them with "cluster is ended".
    pub async fn run_with_retry(&self) -> Result<()> {
        loop {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let delay = {
                        let mut retry = self.retry.lock().await;
                        retry.next_delay(&self.config)
                    };
                    match delay {
                        Some(delay) => {
                            self.set_status(Status::Reconnecting);
                            debug!("retrying cluster connect in {delay:?}");
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            self.end().await;
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Disconnects every node, optionally re-running the connect/retry loop
    /// afterward (§4.F `disconnect(reconnect?)`).
    pub async fn disconnect(&self, reconnect: bool) -> Result<()> {
        self.set_status(Status::Close);
        self.pool.lock().await.reset(&[]).await;
        if reconnect {
            self.run_with_retry().await
        } else {
            self.end().await;
            Ok(())
        }
    }

    /// Terminal shutdown: disconnects every node and wakes every command
    /// still parked on a retry queue so it can observe `end` and fail fast
    /// instead of waiting forever.
    async fn end(&self) {
        self.pool.lock().await.reset(&[]).await;
        self.set_status(Status::End);

        let mut queues = self.queues.lock().await;
        let offline = queues.take_offline();
        let failover = queues.take_failover();
        let cluster_down = queues.take_cluster_down();
        drop(queues);

        for thunk in offline.into_iter().chain(failover).chain(cluster_down) {
            thunk().await;
        }
    }

    async fn drain_offline_queue(&self) {
        let batch = self.queues.lock().await.take_offline();
        for thunk in batch {
            thunk().await;
        }
    }
}
