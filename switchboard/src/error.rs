use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::queue::Queue;

/// Error taxonomy for the whole runtime. Queue-level congestion
/// (`QueueFull`/`QueueEmpty`) is recovered locally by callers via the waiter
/// handles carried on the variant itself; everything else here is either
/// logged and dropped (consume-time errors) or fatal to whichever phase
/// raised it (wiring, actor construction).
#[derive(Error)]
pub enum SwitchboardError {
    #[error("queue '{name}' is full")]
    QueueFull { name: String, queue: Arc<Queue> },

    #[error("queue '{name}' is empty")]
    QueueEmpty { name: String, queue: Arc<Queue> },

    #[error("queue '{queue_name}' is already connected")]
    QueueConnected { queue_name: String },

    #[error("send_event called with no connected queues")]
    NoConnectedQueues,

    #[error("failed to construct actor '{name}': {reason}")]
    ModuleInitFailure { name: String, reason: String },

    #[error("no such module: '{name}'")]
    NoSuchModule { name: String },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl fmt::Debug for SwitchboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl SwitchboardError {
    /// Blocks until the queue behind a `QueueFull` has room for one more
    /// event. No-op (returns immediately) on any other variant.
    pub async fn wait_until_free(&self) {
        if let Self::QueueFull { queue, .. } = self {
            queue.wait_until_free().await;
        }
    }

    /// Blocks until the queue behind a `QueueFull` has fully drained.
    pub async fn wait_until_empty(&self) {
        if let Self::QueueFull { queue, .. } = self {
            queue.wait_until_empty().await;
        }
    }

    /// Blocks until the queue behind a `QueueEmpty` has content again.
    pub async fn wait_until_content(&self) {
        if let Self::QueueEmpty { queue, .. } = self {
            queue.wait_until_content().await;
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }

    pub fn is_empty_err(&self) -> bool {
        matches!(self, Self::QueueEmpty { .. })
    }
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;
