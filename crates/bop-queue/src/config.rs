use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};
use crate::storage::Topology;

/// Capacity used when a configuration does not name one.
const DEFAULT_CAPACITY: usize = 1024;

/// Settings for [`Queue::from_config`](crate::Queue::from_config).
///
/// Missing fields fall back to their defaults when deserialised, so a config
/// file only needs to name what it changes.
///
/// ```rust
/// use bop_queue::{QueueConfig, Topology};
///
/// let config = QueueConfig {
///     capacity: 256,
///     topology: Topology::Mpsc,
///     ..QueueConfig::default()
/// };
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of values the storage holds.
    pub capacity: usize,
    /// How many handles each side may have.
    pub topology: Topology,
    /// Admission limit below the capacity. `None` admits up to the capacity.
    pub soft_max_size: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            topology: Topology::default(),
            soft_max_size: None,
        }
    }
}

impl QueueConfig {
    /// Creates a configuration with the given capacity and default settings.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> QueueResult<()> {
        if self.capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        if let Some(limit) = self.soft_max_size {
            if limit == 0 {
                return Err(QueueError::invalid_config("soft_max_size must be at least 1"));
            }
            if limit > self.capacity {
                return Err(QueueError::invalid_config(format!(
                    "soft_max_size {limit} exceeds capacity {}",
                    self.capacity
                )));
            }
        }
        Ok(())
    }
}
