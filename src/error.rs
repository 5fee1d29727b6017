use std::fmt::{Display, Formatter};

/// Why a command is being retried, surfaced by the single-node client's
/// reject path and consumed by the router's error classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryReason {
    Ask {
        hash_slot: u16,
        address: (String, u16),
    },
    Moved {
        hash_slot: u16,
        address: (String, u16),
    },
}

/// Server-reported error kind, classified from the first word of a Redis
/// error reply.
#[derive(Debug, Clone, PartialEq)]
pub enum RedisErrorKind {
    Ask {
        hash_slot: u16,
        address: (String, u16),
    },
    ClusterDown,
    CrossSlot,
    Err,
    MasterDown,
    MisConf,
    Moved {
        hash_slot: u16,
        address: (String, u16),
    },
    NoAuth,
    NoPerm,
    TryAgain,
    WrongType,
    Other(String),
}

impl From<&str> for RedisErrorKind {
    fn from(str: &str) -> Self {
        match str {
            "CLUSTERDOWN" => Self::ClusterDown,
            "CROSSSLOT" => Self::CrossSlot,
            "ERR" => Self::Err,
            "MASTERDOWN" => Self::MasterDown,
            "MISCONF" => Self::MisConf,
            "NOAUTH" => Self::NoAuth,
            "NOPERM" => Self::NoPerm,
            "TRYAGAIN" => Self::TryAgain,
            "WRONGTYPE" => Self::WrongType,
            _ => {
                let mut iter = str.split_whitespace();
                match (iter.next(), iter.next(), iter.next(), iter.next()) {
                    (Some("ASK"), Some(hash_slot), Some(address), None) => {
                        match parse_redirect_address(hash_slot, address) {
                            Some((hash_slot, address)) => Self::Ask { hash_slot, address },
                            None => Self::Other(str.to_owned()),
                        }
                    }
                    (Some("MOVED"), Some(hash_slot), Some(address), None) => {
                        match parse_redirect_address(hash_slot, address) {
                            Some((hash_slot, address)) => Self::Moved { hash_slot, address },
                            None => Self::Other(str.to_owned()),
                        }
                    }
                    _ => Self::Other(str.to_owned()),
                }
            }
        }
    }
}

fn parse_redirect_address(hash_slot: &str, address: &str) -> Option<(u16, (String, u16))> {
    let hash_slot = hash_slot.parse::<u16>().ok()?;
    let (host, port) = address.split_once(':')?;
    let port = port.parse::<u16>().ok()?;
    Some((hash_slot, (host.to_owned(), port)))
}

impl Display for RedisErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RedisErrorKind::Ask {
                hash_slot,
                address: (host, port),
            } => write!(f, "ASK {hash_slot} {host}:{port}"),
            RedisErrorKind::ClusterDown => f.write_str("CLUSTERDOWN"),
            RedisErrorKind::CrossSlot => f.write_str("CROSSSLOT"),
            RedisErrorKind::Err => f.write_str("ERR"),
            RedisErrorKind::MasterDown => f.write_str("MASTERDOWN"),
            RedisErrorKind::MisConf => f.write_str("MISCONF"),
            RedisErrorKind::Moved {
                hash_slot,
                address: (host, port),
            } => write!(f, "MOVED {hash_slot} {host}:{port}"),
            RedisErrorKind::NoAuth => f.write_str("NOAUTH"),
            RedisErrorKind::NoPerm => f.write_str("NOPERM"),
            RedisErrorKind::TryAgain => f.write_str("TRYAGAIN"),
            RedisErrorKind::WrongType => f.write_str("WRONGTYPE"),
            RedisErrorKind::Other(e) => f.write_str(e),
        }
    }
}

/// Error reported by a single-node client, parsed from its wire-level text.
#[derive(Debug, Clone, PartialEq)]
pub struct RedisError {
    pub kind: RedisErrorKind,
    pub description: String,
}

impl From<&str> for RedisError {
    fn from(error: &str) -> Self {
        match error.split_once(' ') {
            Some(("ASK", _)) | Some(("MOVED", _)) => Self {
                kind: error.into(),
                description: String::new(),
            },
            Some((kind, description)) => Self {
                kind: kind.into(),
                description: description.to_owned(),
            },
            None => Self {
                kind: error.into(),
                description: String::new(),
            },
        }
    }
}

impl Display for RedisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.description)
    }
}

/// All error kinds raised by the cluster routing core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Raised for lifecycle/usage errors within the driver itself.
    #[error("Client error: {0}")]
    Client(String),
    /// Raised while parsing or validating a [`ClusterConfig`](crate::ClusterConfig).
    #[error("Config error: {0}")]
    Config(String),
    /// Error returned by a single-node client, unrelated to redirection.
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
    /// The per-command redirection budget (`max_redirections`) was exhausted.
    #[error("Too many Cluster redirections. Last error: {last_error}")]
    TooManyRedirections { attempts: u32, last_error: String },
    /// Every node contacted during a slot-cache refresh failed.
    #[error("Failed to refresh slots cache.")]
    RefreshFailed { last_node_error: String },
    /// A `CLUSTER SLOTS` probe exceeded its per-node timeout.
    #[error("Refresh probe timed out: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),
    /// The internal event/command channel was dropped.
    #[error("Internal channel closed: {0}")]
    Channel(String),
}

impl Error {
    pub(crate) fn closed() -> Self {
        Error::Client("Connection is closed.".to_owned())
    }

    pub(crate) fn ended() -> Self {
        Error::Client("Cluster is ended.".to_owned())
    }

    pub(crate) fn offline_queue_disabled() -> Self {
        Error::Client("Cluster isn't ready and enableOfflineQueue options is false".to_owned())
    }

    pub(crate) fn no_startup_nodes() -> Self {
        Error::Client("None of startup nodes is available".to_owned())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::Channel(e.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(e: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::Channel(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_moved() {
        let err = RedisError::from("MOVED 12182 10.0.0.2:7000");
        assert_eq!(
            err.kind,
            RedisErrorKind::Moved {
                hash_slot: 12182,
                address: ("10.0.0.2".to_owned(), 7000)
            }
        );
    }

    #[test]
    fn parses_ask() {
        let err = RedisError::from("ASK 5000 10.0.0.3:7000");
        assert_eq!(
            err.kind,
            RedisErrorKind::Ask {
                hash_slot: 5000,
                address: ("10.0.0.3".to_owned(), 7000)
            }
        );
    }

    #[test]
    fn parses_clusterdown_with_description() {
        let err = RedisError::from("CLUSTERDOWN The cluster is down");
        assert_eq!(err.kind, RedisErrorKind::ClusterDown);
        assert_eq!(err.description, "The cluster is down");
    }

    #[test]
    fn falls_back_to_other_for_unknown_kind() {
        let err = RedisError::from("WEIRDCODE something odd");
        assert_eq!(err.kind, RedisErrorKind::Other("WEIRDCODE".to_owned()));
    }
}
