use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::{Actor, Consumer};
use crate::error::Result;
use crate::event::Event;
use crate::queue::Queue;

/// Discards every event it receives. The default `Director` metric/log/
/// failed sinks until a real one is registered in their place.
pub struct NullSink;

#[async_trait]
impl Consumer for NullSink {
    async fn consume(&self, _event: Event, _origin: &str, _origin_queue: Arc<Queue>, _actor: &Actor) -> Result<()> {
        Ok(())
    }
}

/// Emits every event's payload through `tracing` at the configured level
/// and drops it. A reasonable `register_log_actor` choice for a process
/// that already ships structured logs to its own collector.
pub struct TracingLogSink {
    level: tracing::Level,
}

impl TracingLogSink {
    pub fn new(level: tracing::Level) -> Self {
        Self { level }
    }
}

impl Default for TracingLogSink {
    fn default() -> Self {
        Self::new(tracing::Level::INFO)
    }
}

#[async_trait]
impl Consumer for TracingLogSink {
    async fn consume(&self, event: Event, origin: &str, _origin_queue: Arc<Queue>, actor: &Actor) -> Result<()> {
        match self.level {
            tracing::Level::ERROR => tracing::error!(actor = %actor.name(), origin, data = %event.data, "event"),
            tracing::Level::WARN => tracing::warn!(actor = %actor.name(), origin, data = %event.data, "event"),
            tracing::Level::DEBUG => tracing::debug!(actor = %actor.name(), origin, data = %event.data, "event"),
            tracing::Level::TRACE => tracing::trace!(actor = %actor.name(), origin, data = %event.data, "event"),
            tracing::Level::INFO => tracing::info!(actor = %actor.name(), origin, data = %event.data, "event"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn null_sink_accepts_and_discards() {
        let config = RuntimeConfig::default();
        let actor = Actor::new("null", Arc::new(NullSink), &config);
        let queue = Queue::new("inbox", 0);
        let event = Event::new(json!({"n": 1}), None, HashMap::new());
        NullSink.consume(event, "inbox", queue, &actor).await.unwrap();
    }
}
