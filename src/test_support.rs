//! In-process fakes for the two external collaborators named in §6
//! (single-node client, command registry). Used by unit tests across the
//! crate instead of a live Redis Cluster, since the wire protocol is out of
//! scope here.
#![cfg(test)]

use crate::command::Command;
use crate::endpoint::Endpoint;
use crate::error::RedisError;
use crate::node::{NodeFactory, NodeStatus, SingleNodeClient, SlotRangeReply, SubscriptionSnapshot};
use crate::Future;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Ok(Vec<u8>),
    Err(String),
}

#[derive(Default)]
pub struct FakeTopology {
    pub scripts: Mutex<HashMap<String, VecDeque<FakeOutcome>>>,
    pub slots: Mutex<Vec<SlotRangeReply>>,
    pub unreachable: Mutex<HashSet<String>>,
    pub cluster_slots_calls: Mutex<HashMap<String, u32>>,
    pub cluster_slots_delay: Mutex<std::time::Duration>,
}

impl FakeTopology {
    pub fn push_outcome(&self, key: &str, outcome: FakeOutcome) {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_owned())
            .or_default()
            .push_back(outcome);
    }

    pub fn set_slots(&self, slots: Vec<SlotRangeReply>) {
        *self.slots.lock().unwrap() = slots;
    }

    pub fn mark_unreachable(&self, key: &str) {
        self.unreachable.lock().unwrap().insert(key.to_owned());
    }

    pub fn set_cluster_slots_delay(&self, delay: std::time::Duration) {
        *self.cluster_slots_delay.lock().unwrap() = delay;
    }

    pub fn cluster_slots_call_count(&self, key: &str) -> u32 {
        *self
            .cluster_slots_calls
            .lock()
            .unwrap()
            .get(key)
            .unwrap_or(&0)
    }
}

#[derive(Clone, Default)]
pub struct FakeFactory {
    pub topology: Arc<FakeTopology>,
}

pub struct FakeClient {
    endpoint: Endpoint,
    status: NodeStatus,
    topology: Arc<FakeTopology>,
    channels: Vec<String>,
    patterns: Vec<String>,
}

impl NodeFactory for FakeFactory {
    type Client = FakeClient;
    type Options = ();

    fn create(&self, endpoint: &Endpoint, _options: &()) -> FakeClient {
        FakeClient {
            endpoint: endpoint.clone(),
            status: NodeStatus::Wait,
            topology: self.topology.clone(),
            channels: Vec::new(),
            patterns: Vec::new(),
        }
    }
}

impl SingleNodeClient for FakeClient {
    type Response = Vec<u8>;

    fn status(&self) -> NodeStatus {
        self.status
    }

    fn connect(&mut self) -> Future<'_, ()> {
        Box::pin(async move {
            if self
                .topology
                .unreachable
                .lock()
                .unwrap()
                .contains(self.endpoint.key().as_ref())
            {
                return Err(crate::Error::closed());
            }
            self.status = NodeStatus::Ready;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Future<'_, ()> {
        Box::pin(async move {
            self.status = NodeStatus::End;
            Ok(())
        })
    }

    fn send_command(&mut self, command: &dyn Command) -> Future<'_, Vec<u8>> {
        let key = self.endpoint.key();
        let name = command.name().to_owned();
        Box::pin(async move {
            let mut scripts = self.topology.scripts.lock().unwrap();
            let outcome = scripts
                .get_mut(key.as_ref())
                .and_then(|q| q.pop_front());
            match outcome {
                Some(FakeOutcome::Ok(v)) => Ok(v),
                Some(FakeOutcome::Err(e)) => Err(crate::Error::Redis(RedisError::from(e.as_str()))),
                None => Ok(format!("OK:{name}").into_bytes()),
            }
        })
    }

    fn asking(&mut self) {}

    fn cluster_slots(&mut self) -> Future<'_, Vec<SlotRangeReply>> {
        let key = self.endpoint.key();
        Box::pin(async move {
            *self
                .topology
                .cluster_slots_calls
                .lock()
                .unwrap()
                .entry(key.as_ref().to_owned())
                .or_default() += 1;

            let delay = *self.topology.cluster_slots_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if self
                .topology
                .unreachable
                .lock()
                .unwrap()
                .contains(key.as_ref())
            {
                return Err(crate::Error::Redis(RedisError::from("IOERR unreachable")));
            }
            Ok(self.topology.slots.lock().unwrap().clone())
        })
    }

    fn subscribe(&mut self, channels: &[String]) -> Future<'_, ()> {
        self.channels.extend_from_slice(channels);
        Box::pin(async move { Ok(()) })
    }

    fn psubscribe(&mut self, patterns: &[String]) -> Future<'_, ()> {
        self.patterns.extend_from_slice(patterns);
        Box::pin(async move { Ok(()) })
    }

    fn snapshot_subscriptions(&self) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            channels: self.channels.clone(),
            patterns: self.patterns.clone(),
        }
    }
}
