use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::node::SlotRangeReply;
use crate::Result;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const DEFAULT_MAX_REDIRECTIONS: u32 = 16;
pub(crate) const DEFAULT_RETRY_DELAY_ON_FAILOVER_MS: u64 = 100;
pub(crate) const DEFAULT_RETRY_DELAY_ON_CLUSTER_DOWN_MS: u64 = 100;
pub(crate) const DEFAULT_ENABLE_OFFLINE_QUEUE: bool = true;
pub(crate) const DEFAULT_REFRESH_NODE_TIMEOUT_MS: u64 = 1000;

/// Which role(s) a read-only command may be routed to (`scaleReads`, §6).
#[derive(Clone)]
pub enum ScaleReads {
    Master,
    Slave,
    All,
    /// Caller-supplied selector, given the ordered endpoint keys for the
    /// command's slot (primary first). Mirrors the source's behavior of
    /// accepting a function that returns a node, an array to sample from,
    /// or a falsy value meaning "use the default".
    Custom(Arc<dyn Fn(&[crate::endpoint::NodeKey]) -> ScaleReadsPick + Send + Sync>),
}

impl Debug for ScaleReads {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleReads::Master => f.write_str("Master"),
            ScaleReads::Slave => f.write_str("Slave"),
            ScaleReads::All => f.write_str("All"),
            ScaleReads::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Result of a custom [`ScaleReads::Custom`] selector.
pub enum ScaleReadsPick {
    One(crate::endpoint::NodeKey),
    Sample(Vec<crate::endpoint::NodeKey>),
    Default,
}

/// `clusterRetryStrategy(attempt)` (§6): decides how long to wait before the
/// next reconnect attempt, or gives up.
pub trait ClusterRetryStrategy: Send + Sync + 'static {
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// `min(100 + attempt * 2, 2000)`, the source's default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClusterRetryStrategy;

impl ClusterRetryStrategy for DefaultClusterRetryStrategy {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        let ms = (100u64.saturating_add((attempt as u64).saturating_mul(2))).min(2000);
        Some(Duration::from_millis(ms))
    }
}

/// A fixed number of attempts before giving up, every attempt at a constant
/// delay.
#[derive(Debug, Clone, Copy)]
pub struct ConstantRetryStrategy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl ClusterRetryStrategy for ConstantRetryStrategy {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts != 0 && attempt > self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }
}

/// Cluster-wide configuration. Field set mirrors the "Recognized
/// configuration options" table (§6).
#[derive(Clone)]
pub struct ClusterConfig {
    pub startup_nodes: Vec<Endpoint>,
    pub max_redirections: u32,
    pub retry_delay_on_failover: Duration,
    pub retry_delay_on_cluster_down: Duration,
    pub scale_reads: ScaleReads,
    pub enable_offline_queue: bool,
    pub retry_strategy: Arc<dyn ClusterRetryStrategy>,
    /// Per-node timeout while walking nodes during a slot-cache refresh (§4.C step 2).
    pub refresh_node_timeout: Duration,
}

impl Debug for ClusterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("startup_nodes", &self.startup_nodes)
            .field("max_redirections", &self.max_redirections)
            .field("retry_delay_on_failover", &self.retry_delay_on_failover)
            .field(
                "retry_delay_on_cluster_down",
                &self.retry_delay_on_cluster_down,
            )
            .field("scale_reads", &self.scale_reads)
            .field("enable_offline_queue", &self.enable_offline_queue)
            .field("refresh_node_timeout", &self.refresh_node_timeout)
            .finish()
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            startup_nodes: Vec::new(),
            max_redirections: DEFAULT_MAX_REDIRECTIONS,
            retry_delay_on_failover: Duration::from_millis(DEFAULT_RETRY_DELAY_ON_FAILOVER_MS),
            retry_delay_on_cluster_down: Duration::from_millis(
                DEFAULT_RETRY_DELAY_ON_CLUSTER_DOWN_MS,
            ),
            scale_reads: ScaleReads::Master,
            enable_offline_queue: DEFAULT_ENABLE_OFFLINE_QUEUE,
            retry_strategy: Arc::new(DefaultClusterRetryStrategy),
            refresh_node_timeout: Duration::from_millis(DEFAULT_REFRESH_NODE_TIMEOUT_MS),
        }
    }
}

impl ClusterConfig {
    pub fn with_startup_nodes(mut self, nodes: Vec<Endpoint>) -> Self {
        self.startup_nodes = nodes;
        self
    }

    pub fn max_redirections(mut self, value: u32) -> Self {
        self.max_redirections = value;
        self
    }

    pub fn enable_offline_queue(mut self, value: bool) -> Self {
        self.enable_offline_queue = value;
        self
    }

    pub fn scale_reads(mut self, value: ScaleReads) -> Self {
        self.scale_reads = value;
        self
    }
}

/// Converts a caller-friendly value into a [`ClusterConfig`], mirroring the
/// teacher's `IntoConfig`.
pub trait IntoClusterConfig {
    fn into_cluster_config(self) -> Result<ClusterConfig>;
}

impl IntoClusterConfig for ClusterConfig {
    fn into_cluster_config(self) -> Result<ClusterConfig> {
        Ok(self)
    }
}

impl IntoClusterConfig for Vec<(String, u16)> {
    fn into_cluster_config(self) -> Result<ClusterConfig> {
        if self.is_empty() {
            return Err(Error::Config("at least one startup node is required".to_owned()));
        }
        let startup_nodes = self.into_iter().map(Endpoint::from).collect();
        Ok(ClusterConfig::default().with_startup_nodes(startup_nodes))
    }
}

impl IntoClusterConfig for &[&str] {
    fn into_cluster_config(self) -> Result<ClusterConfig> {
        if self.is_empty() {
            return Err(Error::Config("at least one startup node is required".to_owned()));
        }
        let startup_nodes = self
            .iter()
            .map(|s| parse_host_port(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(ClusterConfig::default().with_startup_nodes(startup_nodes))
    }
}

fn parse_host_port(s: &str) -> Result<Endpoint> {
    let s = s.strip_prefix("redis://").unwrap_or(s);
    let url = url::Url::parse(&format!("redis://{s}"))
        .map_err(|e| Error::Config(format!("invalid node address '{s}': {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::Config(format!("missing host in '{s}'")))?
        .to_owned();
    let port = url.port().unwrap_or(6379);
    Ok(Endpoint::new(host, port))
}

/// Converts a `CLUSTER SLOTS` reply row back into the raw endpoint pieces
/// used to build a [`crate::pool::Pool`] reset, preserving primary-first
/// ordering (§4.C step 3).
pub(crate) fn slot_range_endpoints(reply: &SlotRangeReply) -> Vec<Endpoint> {
    reply
        .endpoints
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut e = e.clone();
            e.read_only = i > 0;
            e
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_strategy_caps_at_2000ms() {
        let strategy = DefaultClusterRetryStrategy;
        assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(strategy.next_delay(50), Some(Duration::from_millis(200)));
        assert_eq!(strategy.next_delay(10_000), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn vec_into_cluster_config_rejects_empty() {
        let nodes: Vec<(String, u16)> = Vec::new();
        assert!(nodes.into_cluster_config().is_err());
    }

    #[test]
    fn parses_host_port_strings() {
        let nodes: &[&str] = &["10.0.0.1:7000", "10.0.0.2:7001"];
        let config = nodes.into_cluster_config().unwrap();
        assert_eq!(config.startup_nodes.len(), 2);
        assert_eq!(config.startup_nodes[0].port, 7000);
    }
}
