use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlacklistError {
    #[error("{table} blacklist is full ({capacity} entries)")]
    TableFull {
        table: &'static str,
        capacity: usize,
    },

    #[error("invalid prefix length /{prefix_len} (max /{max})")]
    InvalidPrefixLen { prefix_len: u32, max: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CounterError {
    /// The verdict has no backing slot: the counter table is smaller than
    /// the set of verdicts the engine can produce.
    #[error("no counter slot for action {action} ({slots} slots configured)")]
    SlotMissing { action: u32, slots: usize },
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid MAC address specified, must be in the form '00:00:00:00:00:00', got '{0}'")]
    InvalidMac(String),

    #[error("invalid IP address prefix '{0}', must be in the form '1.1.1.1/32' or '::1/128'")]
    InvalidPrefix(String),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("invalid protocol '{0}', must be either 'udp' or 'tcp'")]
    InvalidProtocol(String),

    #[error("invalid direction '{0}', must be either 'src' or 'dst'")]
    InvalidDirection(String),

    #[error(transparent)]
    Blacklist(#[from] BlacklistError),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("counter shard {0} is not available")]
    ShardUnavailable(usize),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker pool is shut down")]
    Closed,
}
