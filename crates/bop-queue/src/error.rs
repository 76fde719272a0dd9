use std::fmt::{Display, Formatter};

/// Side of a queue a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Producer,
    Consumer,
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Producer => write!(f, "producer"),
            Side::Consumer => write!(f, "consumer"),
        }
    }
}

/// Errors raised while building a queue or minting handles from it.
///
/// Push and pop never produce a `QueueError`: a failed push hands the value
/// back and a failed pop yields `None`.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A queue cannot hold zero elements.
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,
    /// The storage engine cannot address this many slots.
    #[error("queue capacity {0} exceeds the storage limit")]
    CapacityTooLarge(usize),
    /// Configuration value was invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The queue topology does not allow another live handle on this side.
    #[error("{0} limit reached for this queue topology")]
    HandleLimit(Side),
    /// The side was already closed; liveness never comes back.
    #[error("{0} side of the queue is closed")]
    SideClosed(Side),
    /// The storage engine refused to hand out another access token.
    #[error("storage engine has no {0} token left")]
    TokenExhausted(Side),
}

impl QueueError {
    /// Create an invalid configuration error from a displayable value.
    pub fn invalid_config<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::InvalidConfig(msg.to_string())
    }
}

/// Convenience alias for queue setup results.
pub type QueueResult<T> = Result<T, QueueError>;
