use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::queue::Queue;

/// The three reserved outbound queues present on every actor.
pub const RESERVED_QUEUE_NAMES: [&str; 3] = ["logs", "metrics", "failed"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SourceScope {
    Outbound,
    Reserved,
}

/// A per-actor container of four disjoint name -> `Queue` mappings:
/// `inbound`, `outbound`, `error`, and `reserved` (always pre-populated with
/// `logs`/`metrics`/`failed`). Wiring between two actors is realized by
/// making a single `Queue` object simultaneously the producer's outbound
/// entry and the consumer's inbound entry — see `Actor::connect_queue`.
pub struct QueuePool {
    inbound: HashMap<String, Arc<Queue>>,
    outbound: HashMap<String, Arc<Queue>>,
    error: HashMap<String, Arc<Queue>>,
    reserved: HashMap<String, Arc<Queue>>,
    default_capacity: usize,
}

impl QueuePool {
    pub fn new(default_capacity: usize) -> Self {
        let mut reserved = HashMap::new();
        for name in RESERVED_QUEUE_NAMES {
            reserved.insert(name.to_string(), Queue::new(name, default_capacity));
        }
        Self {
            inbound: HashMap::new(),
            outbound: HashMap::new(),
            error: HashMap::new(),
            reserved,
            default_capacity,
        }
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    pub fn add_inbound(&mut self, name: &str, queue: Option<Arc<Queue>>) -> Arc<Queue> {
        let q = queue.unwrap_or_else(|| Queue::new(name, self.default_capacity));
        self.inbound.insert(name.to_string(), Arc::clone(&q));
        q
    }

    pub fn add_outbound(&mut self, name: &str, queue: Option<Arc<Queue>>) -> Arc<Queue> {
        let q = queue.unwrap_or_else(|| Queue::new(name, self.default_capacity));
        self.outbound.insert(name.to_string(), Arc::clone(&q));
        q
    }

    pub fn add_error(&mut self, name: &str, queue: Option<Arc<Queue>>) -> Arc<Queue> {
        let q = queue.unwrap_or_else(|| Queue::new(name, self.default_capacity));
        self.error.insert(name.to_string(), Arc::clone(&q));
        q
    }

    pub fn add_reserved(&mut self, name: &str, queue: Option<Arc<Queue>>) -> Arc<Queue> {
        let q = queue.unwrap_or_else(|| Queue::new(name, self.default_capacity));
        self.reserved.insert(name.to_string(), Arc::clone(&q));
        q
    }

    pub fn inbound(&self) -> &HashMap<String, Arc<Queue>> {
        &self.inbound
    }

    pub fn outbound(&self) -> &HashMap<String, Arc<Queue>> {
        &self.outbound
    }

    pub fn error_queues(&self) -> &HashMap<String, Arc<Queue>> {
        &self.error
    }

    pub fn reserved(&self) -> &HashMap<String, Arc<Queue>> {
        &self.reserved
    }

    pub fn get_inbound(&self, name: &str) -> Option<Arc<Queue>> {
        self.inbound.get(name).cloned()
    }

    pub fn get_outbound(&self, name: &str) -> Option<Arc<Queue>> {
        self.outbound.get(name).cloned()
    }

    pub fn get_reserved(&self, name: &str) -> Option<Arc<Queue>> {
        self.reserved.get(name).cloned()
    }

    /// Source-side lookup used by wiring: reserved-outbound first, else
    /// plain outbound. The `error` map is never consulted on lookup, only
    /// on *installation* of a freshly created queue.
    pub(crate) fn find_source(&self, name: &str) -> Option<(Arc<Queue>, SourceScope)> {
        if let Some(q) = self.reserved.get(name) {
            return Some((Arc::clone(q), SourceScope::Reserved));
        }
        self.outbound
            .get(name)
            .map(|q| (Arc::clone(q), SourceScope::Outbound))
    }

    pub(crate) fn install_source(
        &mut self,
        scope: SourceScope,
        name: &str,
        queue: Arc<Queue>,
        error: bool,
    ) {
        match scope {
            SourceScope::Reserved => {
                self.reserved.insert(name.to_string(), queue);
            }
            SourceScope::Outbound => {
                if error {
                    self.error.insert(name.to_string(), queue);
                } else {
                    self.outbound.insert(name.to_string(), queue);
                }
            }
        }
    }

    /// `move(src_queue, dst_queue, scope)`: replaces the queue installed
    /// under `name` in `scope` with `dst`, preserving any already-pending
    /// content by draining the old queue into `dst` in FIFO order.
    pub(crate) async fn move_queue(
        &mut self,
        scope: SourceScope,
        name: &str,
        dst: Arc<Queue>,
    ) -> Result<Arc<Queue>> {
        let old = match scope {
            SourceScope::Reserved => self.reserved.get(name).cloned(),
            SourceScope::Outbound => self.outbound.get(name).cloned(),
        };
        if let Some(old) = old {
            drain_into(&old, &dst).await;
        }
        match scope {
            SourceScope::Reserved => {
                self.reserved.insert(name.to_string(), Arc::clone(&dst));
            }
            SourceScope::Outbound => {
                self.outbound.insert(name.to_string(), Arc::clone(&dst));
            }
        }
        Ok(dst)
    }
}

async fn drain_into(src: &Arc<Queue>, dst: &Arc<Queue>) {
    while let Ok(event) = src.get(Duration::from_millis(0)).await {
        loop {
            match dst.put(event.clone()).await {
                Ok(()) => break,
                Err(err) => err.wait_until_free().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap as Map;

    #[test]
    fn reserved_queues_present_on_construction() {
        let pool = QueuePool::new(10);
        for name in RESERVED_QUEUE_NAMES {
            assert!(pool.get_reserved(name).is_some(), "missing reserved queue {name}");
        }
    }

    #[tokio::test]
    async fn move_queue_drains_pending_content_in_order() {
        let mut pool = QueuePool::new(0);
        let old = pool.add_outbound("out", None);
        old.put(crate::event::Event::new(json!({"n": 1}), None, Map::new()))
            .await
            .unwrap();
        old.put(crate::event::Event::new(json!({"n": 2}), None, Map::new()))
            .await
            .unwrap();

        let new = Queue::new("new", 0);
        pool.move_queue(SourceScope::Outbound, "out", Arc::clone(&new))
            .await
            .unwrap();

        assert_eq!(pool.get_outbound("out").unwrap().name(), "new");
        let first = new.get(Duration::from_millis(50)).await.unwrap();
        let second = new.get(Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.data["n"], json!(1));
        assert_eq!(second.data["n"], json!(2));
    }
}
