/*!
A client-side routing core for talking to a Redis Cluster.

This crate owns cluster topology and redirection: discovering which node
serves which hash slot, following `-MOVED`/`-ASK` replies, batching retries
behind a `CLUSTERDOWN` or failover, and picking a pub/sub connection. It does
not speak RESP or own a socket — those live behind the [`SingleNodeClient`]
and [`NodeFactory`] traits, so this core can sit in front of any single-node
client implementation.

# Components
* [`ClusterController`] drives the `wait` → `connecting` → `ready` lifecycle
  and reconnect-with-backoff.
* [`Router`] resolves and follows redirections for a single command.
* [`Subscriber`] holds the pub/sub connection and moves it when its node
  drops out of the pool.
* [`ClusterClient`] ties the three together behind one constructor.

# Basic usage

```no_run
# use redcluster_core::{
#     ClusterClient, ClusterConfig, Command, IntoClusterConfig, NodeFactory,
#     SingleNodeClient, StaticCommandRegistry,
# };
# use std::sync::Arc;
# async fn example<F: NodeFactory>(factory: F, options: F::Options) -> redcluster_core::Result<()> {
let registry = Arc::new(StaticCommandRegistry::with_defaults());
let client = ClusterClient::new(
    vec![("10.0.0.1".to_owned(), 7000u16)],
    factory,
    options,
    registry,
)?;
client.connect().await?;
# Ok(())
# }
```
*/

mod cluster_client;
mod command;
mod config;
mod controller;
mod endpoint;
mod error;
mod events;
mod node;
mod pool;
mod queues;
mod refresher;
mod router;
mod slot_map;
mod subscriber;
#[cfg(test)]
mod test_support;

pub use cluster_client::ClusterClient;
pub use command::{Command, CommandFlags, CommandRegistry, SimpleCommand, StaticCommandRegistry};
pub use config::{
    ClusterConfig, ClusterRetryStrategy, ConstantRetryStrategy, DefaultClusterRetryStrategy,
    IntoClusterConfig, ScaleReads, ScaleReadsPick,
};
pub use controller::ClusterController;
pub use endpoint::{Endpoint, NodeKey};
pub use error::*;
pub use events::{ClusterEvent, EventBus, Status};
pub use node::{NodeFactory, NodeStatus, SingleNodeClient, SlotRangeReply, SubscriptionSnapshot};
pub use pool::{NodeHandle, NodeRole, Pool, PoolRole};
pub use queues::{Queues, RetryThunk};
pub use refresher::Refresher;
pub use router::{PinnedNode, Router};
pub use slot_map::SlotMap;
pub use subscriber::Subscriber;

/// Library general result type.
pub type Result<T> = std::result::Result<T, Error>;
/// Library general future type.
pub type Future<'a, T> = futures_util::future::BoxFuture<'a, Result<T>>;
