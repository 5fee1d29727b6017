use crate::endpoint::Endpoint;
use crate::Future;

/// Lifecycle status of a single-node client, as tracked by the pool and the
/// controller. A subset of the cluster-wide [`Status`](crate::events::Status):
/// single nodes never go through `reconnecting`, that policy lives in the
/// controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Wait,
    Connecting,
    Connect,
    Ready,
    End,
}

/// Channels a node was subscribed to before it was replaced as the pub/sub
/// selector, used to re-subscribe the newly selected node (§4.G).
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSnapshot {
    pub channels: Vec<String>,
    pub patterns: Vec<String>,
}

impl SubscriptionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.patterns.is_empty()
    }
}

/// The external collaborator this crate routes commands to: a connection to
/// a single Redis node. The wire protocol, RESP framing and the concrete
/// response type are all out of scope here (§1) and left generic.
pub trait SingleNodeClient: Send + Sync + 'static {
    /// Whatever a successful command submission resolves to.
    type Response: Send + 'static;

    fn status(&self) -> NodeStatus;

    fn connect(&mut self) -> Future<'_, ()>;

    fn disconnect(&mut self) -> Future<'_, ()>;

    /// Submit a pre-built command to this node. Server-sent errors come
    /// back wrapped as [`crate::Error::Redis`] so the router's classifier
    /// (§4.E.1) can match on `kind` without re-parsing wire text.
    fn send_command(&mut self, command: &dyn crate::command::Command) -> Future<'_, Self::Response>;

    /// Arms a one-shot `ASKING` prefix for the next command sent on this
    /// connection (§4.E, ASK handling).
    fn asking(&mut self);

    /// `cluster('slots')`-equivalent probe used by the refresher.
    fn cluster_slots(&mut self) -> Future<'_, Vec<SlotRangeReply>>;

    fn subscribe(&mut self, channels: &[String]) -> Future<'_, ()>;

    fn psubscribe(&mut self, patterns: &[String]) -> Future<'_, ()>;

    fn snapshot_subscriptions(&self) -> SubscriptionSnapshot;
}

/// One row of a `CLUSTER SLOTS` reply: a slot range and its ordered
/// endpoints, primary first.
#[derive(Debug, Clone)]
pub struct SlotRangeReply {
    pub slot_start: u16,
    pub slot_end: u16,
    pub endpoints: Vec<Endpoint>,
}

/// Constructs a [`SingleNodeClient`] for a given endpoint, threading through
/// the opaque `redisOptions` passthrough (§6) as an associated type rather
/// than an untyped blob.
pub trait NodeFactory: Send + Sync + 'static {
    type Client: SingleNodeClient;
    type Options: Clone + Send + Sync + 'static;

    fn create(&self, endpoint: &Endpoint, options: &Self::Options) -> Self::Client;
}
