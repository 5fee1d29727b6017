use std::collections::HashMap;

/// The object the cluster core routes: a command name plus its target slot.
/// The command's promise/reject/resolve side (§6) is modeled separately, as
/// the oneshot completion channel the router hands back from `send()` —
/// this trait only carries what the router needs to read.
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// Precomputed target slot, when the caller already knows it (mirrors
    /// the external `Command.slot()` accessor in §6).
    fn slot(&self) -> Option<u16>;
}

/// A minimal owned command, handed to a [`SingleNodeClient`](crate::node::SingleNodeClient)
/// and usable directly as a [`Command`].
#[derive(Debug, Clone)]
pub struct SimpleCommand {
    pub name: String,
    pub slot: Option<u16>,
    pub args: Vec<Vec<u8>>,
}

impl SimpleCommand {
    pub fn new(name: impl Into<String>, slot: Option<u16>) -> Self {
        Self {
            name: name.into(),
            slot,
            args: Vec::new(),
        }
    }
}

impl Command for SimpleCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn slot(&self) -> Option<u16> {
        self.slot
    }
}

/// Per-command flags the router and controller consult: whether a command
/// may be served by a replica, and whether it enters/exits the connection's
/// subscriber mode (§6, `FLAGS.ENTER_SUBSCRIBER_MODE` / `EXIT_SUBSCRIBER_MODE`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandFlags {
    pub readonly: bool,
    pub enters_subscriber_mode: bool,
    pub exits_subscriber_mode: bool,
}

/// Looks up [`CommandFlags`] by command name, minus wire-protocol
/// `COMMAND INFO` introspection: this registry is populated statically or by
/// the embedding application, since `COMMAND INFO` parsing belongs to the
/// single-node client.
pub trait CommandRegistry: Send + Sync + 'static {
    fn exists(&self, name: &str) -> bool;
    fn flags(&self, name: &str) -> CommandFlags;

    fn is_readonly(&self, name: &str) -> bool {
        self.flags(name).readonly
    }

    fn enters_subscriber_mode(&self, name: &str) -> bool {
        self.flags(name).enters_subscriber_mode
    }

    fn exits_subscriber_mode(&self, name: &str) -> bool {
        self.flags(name).exits_subscriber_mode
    }
}

/// A [`CommandRegistry`] backed by a plain map, good enough for embedding
/// applications that know their command set up front and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCommandRegistry {
    flags: HashMap<String, CommandFlags>,
}

impl StaticCommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, flags: CommandFlags) -> Self {
        self.flags.insert(name.into(), flags);
        self
    }

    /// Registers the handful of commands every embedder needs to get
    /// subscriber-mode transitions and read scaling right out of the box.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for name in ["SUBSCRIBE", "PSUBSCRIBE", "SSUBSCRIBE"] {
            registry.flags.insert(
                name.to_owned(),
                CommandFlags {
                    enters_subscriber_mode: true,
                    ..Default::default()
                },
            );
        }
        for name in ["UNSUBSCRIBE", "PUNSUBSCRIBE", "SUNSUBSCRIBE"] {
            registry.flags.insert(
                name.to_owned(),
                CommandFlags {
                    exits_subscriber_mode: true,
                    ..Default::default()
                },
            );
        }
        for name in [
            "GET", "MGET", "EXISTS", "STRLEN", "HGET", "HMGET", "HGETALL", "SMEMBERS",
            "SISMEMBER", "LRANGE", "LLEN", "ZRANGE", "ZSCORE", "TTL", "TYPE",
        ] {
            registry.flags.insert(
                name.to_owned(),
                CommandFlags {
                    readonly: true,
                    ..Default::default()
                },
            );
        }
        registry
    }
}

impl CommandRegistry for StaticCommandRegistry {
    fn exists(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    fn flags(&self, name: &str) -> CommandFlags {
        self.flags.get(name).copied().unwrap_or_default()
    }
}
