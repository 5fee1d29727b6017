use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// A cluster member address, as returned by `CLUSTER SLOTS`/`CLUSTER SHARDS`
/// or supplied as a startup node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub read_only: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            read_only: false,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// The stable `"host:port"` identity used throughout the pool and slot map.
    pub fn key(&self) -> NodeKey {
        NodeKey::new(format!("{}:{}", self.host, self.port))
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<(String, u16)> for Endpoint {
    fn from((host, port): (String, u16)) -> Self {
        Endpoint::new(host, port)
    }
}

/// Cheaply-cloneable `"host:port"` key identifying a node across the pool,
/// slot map and router.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(Arc<str>);

impl NodeKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }
}

impl AsRef<str> for NodeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<(&str, u16)> for NodeKey {
    fn from((host, port): (&str, u16)) -> Self {
        NodeKey::new(format!("{host}:{port}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_host_colon_port() {
        let e = Endpoint::new("10.0.0.1", 7000);
        assert_eq!(e.key().as_ref(), "10.0.0.1:7000");
    }
}
