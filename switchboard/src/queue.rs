use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::timeout as tokio_timeout;

use crate::error::{Result, SwitchboardError};
use crate::event::Event;

/// Point-in-time snapshot of a queue's throughput and occupancy, as emitted
/// by the metric emitter (one `MetricRecord` per field, per queue, per
/// `Director`-configured interval).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueStats {
    pub size: usize,
    pub capacity: usize,
    pub total_in: u64,
    pub total_out: u64,
}

impl QueueStats {
    /// `(name, value)` pairs in the order a metric emitter walks them when
    /// building one metric event per stat.
    pub fn as_pairs(&self) -> [(&'static str, f64); 4] {
        [
            ("size", self.size as f64),
            ("capacity", self.capacity as f64),
            ("total_in", self.total_in as f64),
            ("total_out", self.total_out as f64),
        ]
    }
}

/// A named, bounded FIFO of `Event`s with edge-triggered, single-shot
/// waiters for "has content" and "has room."
///
/// `capacity == 0` means unbounded: `put` never fails with `QueueFull` and
/// `wait_until_free`/`wait_until_empty` resolve based on `size() == 0` only
/// for the "empty" case (an unbounded queue always has room).
///
/// Thread-safety: `put`/`get`/`rescue` serialize through an internal
/// `tokio::sync::Mutex`. This makes the queue safe to share between a
/// producer actor's workers, a consumer actor's workers, and the metric
/// emitter under real OS-thread preemption — a strictly stronger guarantee
/// than the single-threaded cooperative scheduling the behavior is modeled
/// on (see the concurrency design note in `SPEC_FULL.md`).
pub struct Queue {
    name: String,
    capacity: usize,
    inner: Mutex<VecDeque<Event>>,
    current_size: AtomicUsize,
    non_empty: Notify,
    non_full: Notify,
    total_in: AtomicU64,
    total_out: AtomicU64,
}

impl Queue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            capacity,
            inner: Mutex::new(VecDeque::new()),
            current_size: AtomicUsize::new(0),
            non_empty: Notify::new(),
            non_full: Notify::new(),
            total_in: AtomicU64::new(0),
            total_out: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.current_size.load(Ordering::SeqCst)
    }

    pub fn has_space(&self) -> bool {
        self.capacity == 0 || self.size() < self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            size: self.size(),
            capacity: self.capacity,
            total_in: self.total_in.load(Ordering::SeqCst),
            total_out: self.total_out.load(Ordering::SeqCst),
        }
    }

    /// Appends at the tail. Fails with `QueueFull` when `size == capacity`
    /// and `capacity > 0`; the error carries `wait_until_free`/
    /// `wait_until_empty` accessors bound to `self`.
    pub async fn put(self: &Arc<Self>, event: Event) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if self.capacity > 0 && guard.len() >= self.capacity {
            drop(guard);
            return Err(SwitchboardError::QueueFull {
                name: self.name.clone(),
                queue: Arc::clone(self),
            });
        }
        guard.push_back(event);
        self.current_size.store(guard.len(), Ordering::SeqCst);
        drop(guard);
        self.total_in.fetch_add(1, Ordering::SeqCst);
        self.non_empty.notify_waiters();
        Ok(())
    }

    /// Pops the head, waiting up to `timeout` for content to arrive if the
    /// queue is currently empty. Fails with `QueueEmpty` only if nothing
    /// arrived within `timeout`; no event is consumed on failure.
    pub async fn get(self: &Arc<Self>, timeout: Duration) -> Result<Event> {
        loop {
            let notified = self.non_empty.notified();
            {
                let mut guard = self.inner.lock().await;
                if let Some(event) = guard.pop_front() {
                    self.current_size.store(guard.len(), Ordering::SeqCst);
                    drop(guard);
                    self.total_out.fetch_add(1, Ordering::SeqCst);
                    self.non_full.notify_waiters();
                    return Ok(event);
                }
            }
            if tokio_timeout(timeout, notified).await.is_err() {
                return Err(SwitchboardError::QueueEmpty {
                    name: self.name.clone(),
                    queue: Arc::clone(self),
                });
            }
        }
    }

    /// Reinserts at the head for retry, without signalling `non_full` (the
    /// queue did not actually gain free space — it's the same event going
    /// back in). Used by `Actor::do_consume` when a downstream `send_event`
    /// hits `QueueFull` after the consumer already popped the original.
    pub async fn rescue(&self, event: Event) {
        let mut guard = self.inner.lock().await;
        guard.push_front(event);
        self.current_size.store(guard.len(), Ordering::SeqCst);
        drop(guard);
        self.non_empty.notify_waiters();
    }

    /// Blocks until `size() > 0`. Registers for the `non_empty` wake before
    /// checking the condition so a concurrent `put` between the check and
    /// the wait can never be missed.
    pub(crate) async fn wait_until_content(&self) {
        loop {
            let notified = self.non_empty.notified();
            if self.size() > 0 {
                return;
            }
            notified.await;
        }
    }

    /// Blocks until the queue has room for one more event.
    pub(crate) async fn wait_until_free(&self) {
        loop {
            let notified = self.non_full.notified();
            if self.has_space() {
                return;
            }
            notified.await;
        }
    }

    /// Blocks until the queue has fully drained to empty.
    pub(crate) async fn wait_until_empty(&self) {
        loop {
            let notified = self.non_full.notified();
            if self.size() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn ev(n: i64) -> Event {
        Event::new(json!({"n": n}), None, HashMap::new())
    }

    #[tokio::test]
    async fn fifo_order_is_strict() {
        let q = Queue::new("q", 0);
        for i in 0..5 {
            q.put(ev(i)).await.unwrap();
        }
        for i in 0..5 {
            let e = q.get(Duration::from_millis(50)).await.unwrap();
            assert_eq!(e.data["n"], json!(i));
        }
    }

    #[tokio::test]
    async fn put_fails_full_at_capacity() {
        let q = Queue::new("bounded", 2);
        q.put(ev(1)).await.unwrap();
        q.put(ev(2)).await.unwrap();
        let err = q.put(ev(3)).await.unwrap_err();
        assert!(err.is_full());
        assert_eq!(q.size(), 2);
    }

    #[tokio::test]
    async fn get_fails_empty_after_timeout_without_consuming() {
        let q = Queue::new("q", 0);
        let err = q.get(Duration::from_millis(20)).await.unwrap_err();
        assert!(err.is_empty_err());
        assert_eq!(q.size(), 0);
    }

    #[tokio::test]
    async fn never_exceeds_capacity_under_concurrent_producers() {
        let q = Queue::new("q", 4);
        let mut handles = Vec::new();
        for i in 0..20 {
            let q = Arc::clone(&q);
            handles.push(tokio::spawn(async move {
                loop {
                    match q.put(ev(i)).await {
                        Ok(()) => break,
                        Err(e) => e.wait_until_free().await,
                    }
                    assert!(q.size() <= 4);
                }
            }));
        }
        // Drain concurrently with producers still retrying.
        let drain_q = Arc::clone(&q);
        let drainer = tokio::spawn(async move {
            for _ in 0..20 {
                loop {
                    match drain_q.get(Duration::from_millis(5)).await {
                        Ok(_) => break,
                        Err(_) => continue,
                    }
                }
            }
        });
        for h in handles {
            h.await.unwrap();
        }
        drainer.await.unwrap();
        assert_eq!(q.size(), 0);
    }

    #[tokio::test]
    async fn rescue_reinserts_at_head_for_exactly_once_delivery() {
        let q = Queue::new("q", 0);
        q.put(ev(1)).await.unwrap();
        q.put(ev(2)).await.unwrap();
        let first = q.get(Duration::from_millis(50)).await.unwrap();
        q.rescue(first).await;
        let again = q.get(Duration::from_millis(50)).await.unwrap();
        assert_eq!(again.data["n"], json!(1));
        let second = q.get(Duration::from_millis(50)).await.unwrap();
        assert_eq!(second.data["n"], json!(2));
    }

    #[tokio::test]
    async fn wait_until_content_wakes_on_put() {
        let q = Queue::new("q", 0);
        let waiter_q = Arc::clone(&q);
        let waiter = tokio::spawn(async move {
            waiter_q.wait_until_content().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.put(ev(1)).await.unwrap();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter should wake promptly")
            .unwrap();
    }
}
