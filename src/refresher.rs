use crate::config::slot_range_endpoints;
use crate::endpoint::{Endpoint, NodeKey};
use crate::error::Error;
use crate::events::{ClusterEvent, EventBus};
use crate::node::NodeFactory;
use crate::pool::{Pool, PoolRole};
use crate::slot_map::SlotMap;
use crate::Result;
use log::{debug, warn};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

#[derive(Clone)]
enum RefreshOutcome {
    Ok,
    Err(String),
}

/// Slot-Cache Refresher (§4.C). Holds shared handles to the pool and slot
/// map it rebuilds on success, and coordinates so that at most one
/// `CLUSTER SLOTS` walk is ever in flight: a caller arriving while one is
/// already running attaches to it instead of starting a second walk.
pub struct Refresher<F: NodeFactory> {
    pool: Arc<Mutex<Pool<F>>>,
    slot_map: Arc<Mutex<SlotMap>>,
    events: EventBus,
    coordinator: Arc<Mutex<Option<broadcast::Sender<RefreshOutcome>>>>,
    node_timeout: Duration,
}

impl<F: NodeFactory> Refresher<F> {
    pub fn new(
        pool: Arc<Mutex<Pool<F>>>,
        slot_map: Arc<Mutex<SlotMap>>,
        events: EventBus,
        node_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            slot_map,
            events,
            coordinator: Arc::new(Mutex::new(None)),
            node_timeout,
        }
    }

    /// Runs the algorithm of §4.C, or attaches to an in-flight run.
    pub async fn refresh_now(&self) -> Result<()> {
        let mut guard = self.coordinator.lock().await;
        if let Some(sender) = guard.as_ref() {
            let mut rx = sender.subscribe();
            drop(guard);
            return match rx.recv().await {
                Ok(RefreshOutcome::Ok) => Ok(()),
                Ok(RefreshOutcome::Err(e)) => Err(Error::RefreshFailed { last_node_error: e }),
                Err(_) => Err(Error::RefreshFailed {
                    last_node_error: "refresh coordinator dropped".to_owned(),
                }),
            };
        }
        let (tx, _rx) = broadcast::channel(1);
        *guard = Some(tx.clone());
        drop(guard);

        let outcome = self.walk_nodes().await;

        let mut guard = self.coordinator.lock().await;
        *guard = None;
        drop(guard);

        let _ = tx.send(match &outcome {
            Ok(()) => RefreshOutcome::Ok,
            Err(e) => RefreshOutcome::Err(e.to_string()),
        });
        outcome
    }

    async fn walk_nodes(&self) -> Result<()> {
        let mut keys: Vec<NodeKey> = self
            .pool
            .lock()
            .await
            .nodes(PoolRole::All)
            .into_iter()
            .map(|h| h.key)
            .collect();
        keys.shuffle(&mut rand::rng());

        let mut last_error = String::from("no reachable startup nodes");

        for key in keys {
            let handle = match self.pool.lock().await.get(&key) {
                Some(h) => h,
                None => continue,
            };

            let probe = {
                let client = handle.client.clone();
                async move { client.lock().await.cluster_slots().await }
            };

            match tokio::time::timeout(self.node_timeout, probe).await {
                Ok(Ok(rows)) => {
                    let mut endpoint_set: HashMap<String, Endpoint> = HashMap::new();
                    let mut ranges: Vec<(u16, u16, Vec<NodeKey>)> = Vec::with_capacity(rows.len());

                    for row in &rows {
                        let endpoints = slot_range_endpoints(row);
                        let node_keys: Vec<NodeKey> =
                            endpoints.iter().map(Endpoint::key).collect();
                        for endpoint in &endpoints {
                            endpoint_set
                                .entry(endpoint.key().as_ref().to_owned())
                                .or_insert_with(|| endpoint.clone());
                        }
                        ranges.push((row.slot_start, row.slot_end, node_keys));
                    }

                    let all_endpoints: Vec<Endpoint> = endpoint_set.into_values().collect();
                    self.pool.lock().await.reset(&all_endpoints).await;
                    self.slot_map.lock().await.replace_all(&ranges);
                    self.events.emit(ClusterEvent::Refresh);
                    debug!("slot cache refreshed from {key}");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!("refresh probe against {key} failed: {last_error}");
                    self.events.emit(ClusterEvent::NodeError {
                        node: key.clone(),
                        error: last_error.clone(),
                    });
                }
                Err(_) => {
                    last_error = format!("timed out after {:?}", self.node_timeout);
                    warn!("refresh probe against {key} timed out");
                    self.events.emit(ClusterEvent::NodeError {
                        node: key.clone(),
                        error: last_error.clone(),
                    });
                }
            }
        }

        Err(Error::RefreshFailed {
            last_node_error: last_error,
        })
    }
}
