use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::RuntimeConfig;
use crate::error::{Result, SwitchboardError};
use crate::event::Event;
use crate::metrics::MetricRecord;
use crate::pool::QueuePool;
use crate::queue::Queue;
use crate::supervisor::SupervisedPool;

/// User-supplied behaviour for an `Actor`. `consume` is invoked once per
/// inbound event, handed the popped `Event`, the inbound queue it arrived on
/// (`origin`/`origin_queue`, for error rescue), and an `Actor` handle for
/// calling back into `send_event`/`send_error`.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn consume(
        &self,
        event: Event,
        origin: &str,
        origin_queue: Arc<Queue>,
        actor: &Actor,
    ) -> Result<()>;

    /// Runs once, after queues are wired but before the `started` gate
    /// opens. Default is a no-op; override for one-time setup.
    async fn pre_hook(&self, _actor: &Actor) {}

    /// Runs once, after every consumer has drained and exited.
    async fn post_hook(&self, _actor: &Actor) {}

    /// Builds a fresh `Event` for this actor to originate (as opposed to
    /// one received from an inbound queue). Override to set a default
    /// `service` tag or header set.
    fn create_event(&self, data: Value, service: Option<String>, headers: HashMap<String, String>) -> Event {
        Event::new(data, service, headers)
    }
}

/// Construction-time knobs, matching an unbounded queue, metrics on, and
/// non-blocking consume as the baseline actor defaults.
#[derive(Clone, Debug)]
pub struct ActorOptions {
    pub capacity: usize,
    pub generate_metrics: bool,
    pub blocking_consume: bool,
}

impl Default for ActorOptions {
    fn default() -> Self {
        Self {
            capacity: 0,
            generate_metrics: true,
            blocking_consume: false,
        }
    }
}

/// A named runtime unit owning a `QueuePool` and a `SupervisedPool` of
/// consumer workers. See `Consumer` for the behaviour actors plug in.
pub struct Actor {
    name: String,
    pool: RwLock<QueuePool>,
    threads: SupervisedPool,
    consumer: Arc<dyn Consumer>,
    shutdown_token: CancellationToken,
    started_tx: watch::Sender<bool>,
    started_rx: watch::Receiver<bool>,
    blocking_consume: bool,
    generate_metrics: bool,
    metrics_frequency: Duration,
    get_timeout: Duration,
    config: RuntimeConfig,
}

impl Actor {
    pub fn new(name: impl Into<String>, consumer: Arc<dyn Consumer>, config: &RuntimeConfig) -> Arc<Self> {
        Self::with_options(name, consumer, config, ActorOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        consumer: Arc<dyn Consumer>,
        config: &RuntimeConfig,
        options: ActorOptions,
    ) -> Arc<Self> {
        let name = name.into();
        let (started_tx, started_rx) = watch::channel(false);
        Arc::new(Self {
            pool: RwLock::new(QueuePool::new(options.capacity)),
            threads: SupervisedPool::new(name.clone(), config.restart_interval),
            consumer,
            shutdown_token: CancellationToken::new(),
            started_tx,
            started_rx,
            blocking_consume: options.blocking_consume,
            generate_metrics: options.generate_metrics,
            metrics_frequency: config.metrics_frequency,
            get_timeout: config.get_timeout,
            config: config.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_looping(&self) -> bool {
        !self.shutdown_token.is_cancelled()
    }

    /// Blocks until `stop()` has been called. Safe to call before or after
    /// the gate opens.
    pub async fn block(&self) {
        self.shutdown_token.cancelled().await;
    }

    async fn wait_until_started(&self) {
        let mut rx = self.started_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.wait_for(|v| *v).await;
    }

    pub async fn get_inbound(&self, name: &str) -> Option<Arc<Queue>> {
        self.pool.read().await.get_inbound(name)
    }

    pub async fn get_outbound(&self, name: &str) -> Option<Arc<Queue>> {
        self.pool.read().await.get_outbound(name)
    }

    pub async fn get_reserved(&self, name: &str) -> Option<Arc<Queue>> {
        self.pool.read().await.get_reserved(name)
    }

    /// Registers `queue` as the inbound named `queue_name` and starts a
    /// supervised consumer task draining it. Safe to call before or after
    /// `start()` — the task itself waits for the `started` gate.
    pub async fn register_consumer(self: &Arc<Self>, queue_name: &str, queue: Arc<Queue>) {
        {
            let mut pool = self.pool.write().await;
            pool.add_inbound(queue_name, Some(Arc::clone(&queue)));
        }
        self.spawn_consumer(queue).await;
    }

    async fn spawn_consumer(self: &Arc<Self>, queue: Arc<Queue>) {
        let actor = Arc::clone(self);
        let worker_name = format!("consumer:{}", queue.name());
        self.threads
            .spawn(worker_name, true, move || {
                let actor = Arc::clone(&actor);
                let queue = Arc::clone(&queue);
                async move { Self::run_consumer(actor, queue).await }
            })
            .await;
    }

    /// `connect_queue(source_queue_name, destination, destination_queue_name)`:
    /// wires this actor's outbound `source_queue_name` to `destination`'s
    /// inbound `destination_queue_name`. See `QueuePool` for the four wiring
    /// cases; `check_existing` (default true at call sites outside the
    /// Director's reserved-sink fan-out) makes an already-wired source or
    /// destination a hard error instead of a silent reconciliation.
    pub async fn connect_queue(
        self: &Arc<Self>,
        source_queue_name: &str,
        destination: &Arc<Actor>,
        destination_queue_name: &str,
        error_queue: bool,
        check_existing: bool,
    ) -> Result<()> {
        let found = {
            let pool = self.pool.read().await;
            pool.find_source(source_queue_name)
        };
        let dest_queue = {
            let pool = destination.pool.read().await;
            pool.get_inbound(destination_queue_name)
        };

        if check_existing {
            if found.is_some() {
                return Err(SwitchboardError::QueueConnected {
                    queue_name: source_queue_name.to_string(),
                });
            }
            if dest_queue.is_some() {
                return Err(SwitchboardError::QueueConnected {
                    queue_name: destination_queue_name.to_string(),
                });
            }
        }

        match (found, dest_queue) {
            (None, None) => {
                let queue = {
                    let mut pool = self.pool.write().await;
                    if error_queue {
                        pool.add_error(source_queue_name, None)
                    } else {
                        pool.add_outbound(source_queue_name, None)
                    }
                };
                destination
                    .register_consumer(destination_queue_name, queue)
                    .await;
            }
            (None, Some(dest_queue)) => {
                let mut pool = self.pool.write().await;
                if error_queue {
                    pool.add_error(source_queue_name, Some(dest_queue));
                } else {
                    pool.add_outbound(source_queue_name, Some(dest_queue));
                }
            }
            (Some((source_queue, _scope)), None) => {
                destination
                    .register_consumer(destination_queue_name, source_queue)
                    .await;
            }
            (Some((_source_queue, scope)), Some(dest_queue)) => {
                let mut pool = self.pool.write().await;
                pool.move_queue(scope, source_queue_name, dest_queue).await?;
            }
        }

        tracing::info!(
            source = source_queue_name,
            destination_actor = %destination.name,
            destination_queue = destination_queue_name,
            "connected queue"
        );
        Ok(())
    }

    pub async fn connect_error_queue(
        self: &Arc<Self>,
        source_queue_name: &str,
        destination: &Arc<Actor>,
        destination_queue_name: &str,
        check_existing: bool,
    ) -> Result<()> {
        self.connect_queue(source_queue_name, destination, destination_queue_name, true, check_existing)
            .await
    }

    /// `start()`: spawns the metric emitter if enabled, runs `pre_hook`,
    /// then opens the `started` gate so every registered consumer begins
    /// draining its queue.
    pub async fn start(self: &Arc<Self>) {
        if self.generate_metrics {
            let actor = Arc::clone(self);
            self.threads
                .spawn("metric_emitter", true, move || {
                    let actor = Arc::clone(&actor);
                    async move { Self::run_metric_emitter(actor).await }
                })
                .await;
        }

        self.consumer.pre_hook(self).await;

        let _ = self.started_tx.send(true);
        tracing::debug!(
            actor = %self.name,
            metrics_frequency = ?self.metrics_frequency,
            "actor started"
        );
    }

    /// `stop()`: cancels the shutdown token (consumers finish draining then
    /// exit, and `block()` returns), waits for every worker to exit, then
    /// runs `post_hook`.
    pub async fn stop(self: &Arc<Self>) {
        self.shutdown_token.cancel();
        self.threads.join().await;
        self.consumer.post_hook(self).await;
        tracing::debug!(actor = %self.name, "actor stopped");
    }

    /// Sends `event` to `queue` if given, else to every queue in `queues`,
    /// else to every outbound queue. All recipients but one receive an
    /// identity-preserving copy rather than the original. A call that
    /// resolves to zero recipients surfaces `NoConnectedQueues` rather than
    /// silently dropping the event.
    pub async fn send_event(
        self: &Arc<Self>,
        event: Event,
        queue: Option<Arc<Queue>>,
        queues: Option<Vec<Arc<Queue>>>,
    ) -> Result<()> {
        if let Some(queue) = queue {
            return self.submit(event, &queue).await;
        }
        let targets = match queues {
            Some(qs) => qs,
            None => self.pool.read().await.outbound().values().cloned().collect(),
        };
        if targets.is_empty() {
            return Err(SwitchboardError::NoConnectedQueues);
        }
        self.loop_submit(event, targets).await
    }

    /// Calls `send_event` with every error queue as the recipient set. A
    /// call with no error queues registered and no explicit `queue` is a
    /// silent no-op rather than an error — there is nothing to send to.
    pub async fn send_error(
        self: &Arc<Self>,
        event: Event,
        queue: Option<Arc<Queue>>,
        queues: Option<Vec<Arc<Queue>>>,
    ) -> Result<()> {
        let targets = match queues {
            Some(qs) => Some(qs),
            None => {
                let errs: Vec<_> = self.pool.read().await.error_queues().values().cloned().collect();
                if errs.is_empty() {
                    None
                } else {
                    Some(errs)
                }
            }
        };
        if targets.is_none() && queue.is_none() {
            return Ok(());
        }
        self.send_event(event, queue, targets).await
    }

    async fn loop_submit(self: &Arc<Self>, event: Event, targets: Vec<Arc<Queue>>) -> Result<()> {
        let total = targets.len();
        for (index, queue) in targets.into_iter().enumerate() {
            if index + 1 == total {
                self.submit(event, &queue).await?;
                break;
            }
            self.submit(event.copy_preserving_id(), &queue).await?;
        }
        Ok(())
    }

    /// Puts `event` onto `queue`, retrying on `QueueFull` until it fits or
    /// the actor is stopped mid-wait, in which case the pending submit is
    /// abandoned and the event is dropped.
    async fn submit(self: &Arc<Self>, event: Event, queue: &Arc<Queue>) -> Result<()> {
        loop {
            if self.shutdown_token.is_cancelled() {
                return Ok(());
            }
            match queue.put(event.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tokio::select! {
                        _ = self.shutdown_token.cancelled() => return Ok(()),
                        _ = err.wait_until_empty() => {}
                    }
                }
            }
        }
    }

    async fn run_consumer(actor: Arc<Actor>, queue: Arc<Queue>) -> std::result::Result<(), String> {
        actor.wait_until_started().await;

        loop {
            let event = tokio::select! {
                _ = actor.shutdown_token.cancelled() => break,
                result = queue.get(actor.get_timeout) => match result {
                    Ok(event) => event,
                    Err(_) => continue,
                },
            };

            let original_data = event.snapshot_data();
            if actor.blocking_consume {
                Self::do_consume(Arc::clone(&actor), event, Arc::clone(&queue), original_data).await;
            } else {
                let actor = Arc::clone(&actor);
                let queue = Arc::clone(&queue);
                actor
                    .threads
                    .spawn(format!("consume:{}", queue.name()), false, move || {
                        let actor = Arc::clone(&actor);
                        let queue = Arc::clone(&queue);
                        let event = event.clone();
                        let original_data = original_data.clone();
                        async move {
                            Self::do_consume(actor, event, queue, original_data).await;
                            Ok(())
                        }
                    })
                    .await;
            }
        }

        // Drain phase: deliver whatever is still queued before exiting.
        loop {
            if queue.size() == 0 {
                break;
            }
            match queue.get(Duration::from_millis(0)).await {
                Ok(event) => {
                    let original_data = event.snapshot_data();
                    let actor = Arc::clone(&actor);
                    let queue = Arc::clone(&queue);
                    actor
                        .threads
                        .spawn(format!("drain:{}", queue.name()), false, move || {
                            let actor = Arc::clone(&actor);
                            let queue = Arc::clone(&queue);
                            let event = event.clone();
                            let original_data = original_data.clone();
                            async move {
                                Self::do_consume(actor, event, queue, original_data).await;
                                Ok(())
                            }
                        })
                        .await;
                }
                Err(_) => break,
            }
        }

        Ok(())
    }

    async fn do_consume(actor: Arc<Actor>, mut event: Event, origin_queue: Arc<Queue>, original_data: Value) {
        let origin = origin_queue.name().to_string();
        let consumer = Arc::clone(&actor.consumer);
        match consumer
            .consume(event.clone(), &origin, Arc::clone(&origin_queue), &actor)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_full() => {
                event.restore_data(original_data);
                origin_queue.rescue(event).await;
                err.wait_until_free().await;
            }
            Err(err) => {
                tracing::error!(actor = %actor.name, origin = %origin, error = %err, "consume failed");
                if let Some(logs) = actor.pool.read().await.get_reserved("logs") {
                    let record = Event::new(
                        serde_json::json!({
                            "actor": actor.name,
                            "origin": origin,
                            "error": err.to_string(),
                        }),
                        None,
                        HashMap::new(),
                    );
                    let _ = logs.put(record).await;
                }
            }
        }
    }

    async fn run_metric_emitter(actor: Arc<Actor>) -> std::result::Result<(), String> {
        actor.wait_until_started().await;

        while actor.is_looping() {
            let snapshot: Vec<(String, crate::queue::QueueStats)> = {
                let pool = actor.pool.read().await;
                pool.outbound().iter().map(|(n, q)| (n.clone(), q.stats())).collect()
            };

            for (queue_name, stats) in snapshot {
                let records = MetricRecord::from_queue_stats(now_unix(), &actor.config, &actor.name, &queue_name, stats);
                for record in records {
                    let metrics_queue = actor
                        .pool
                        .read()
                        .await
                        .get_reserved("metrics")
                        .expect("reserved metrics queue always present");
                    while actor.is_looping() {
                        let event = Event::new(record.to_event_data(), None, HashMap::new());
                        match metrics_queue.put(event).await {
                            Ok(()) => break,
                            Err(err) => {
                                tokio::select! {
                                    _ = actor.shutdown_token.cancelled() => break,
                                    _ = err.wait_until_empty() => {}
                                }
                            }
                        }
                    }
                }
            }

            tokio::select! {
                _ = actor.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(actor.metrics_frequency) => {}
            }
        }

        Ok(())
    }
}

fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex as AsyncMutex;

    struct Forwarder;

    #[async_trait]
    impl Consumer for Forwarder {
        async fn consume(&self, event: Event, _origin: &str, _origin_queue: Arc<Queue>, actor: &Actor) -> Result<()> {
            actor.send_event(event, None, None).await
        }
    }

    struct Collector {
        received: Arc<AsyncMutex<Vec<Event>>>,
    }

    #[async_trait]
    impl Consumer for Collector {
        async fn consume(&self, event: Event, _origin: &str, _origin_queue: Arc<Queue>, _actor: &Actor) -> Result<()> {
            self.received.lock().await.push(event);
            Ok(())
        }
    }

    fn no_metrics() -> ActorOptions {
        ActorOptions {
            generate_metrics: false,
            ..ActorOptions::default()
        }
    }

    #[tokio::test]
    async fn connected_actors_deliver_events_end_to_end() {
        let config = RuntimeConfig::default();
        let received = Arc::new(AsyncMutex::new(Vec::new()));
        let source = Actor::with_options("source", Arc::new(Forwarder), &config, no_metrics());
        let sink = Actor::with_options(
            "sink",
            Arc::new(Collector {
                received: Arc::clone(&received),
            }),
            &config,
            no_metrics(),
        );

        source
            .connect_queue("outbox", &sink, "inbox", false, true)
            .await
            .unwrap();

        source.start().await;
        sink.start().await;

        let outbox = source.get_outbound("outbox").await.unwrap();
        source
            .send_event(Event::new(json!({"n": 1}), None, HashMap::new()), Some(outbox), None)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if !received.lock().await.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sink should receive the forwarded event");

        assert_eq!(received.lock().await[0].data["n"], json!(1));

        source.stop().await;
        sink.stop().await;
    }

    #[tokio::test]
    async fn connect_queue_rejects_already_wired_source_when_checked() {
        let config = RuntimeConfig::default();
        let a = Actor::with_options("a", Arc::new(Forwarder), &config, no_metrics());
        let b = Actor::with_options(
            "b",
            Arc::new(Collector {
                received: Arc::new(AsyncMutex::new(Vec::new())),
            }),
            &config,
            no_metrics(),
        );
        let c = Actor::with_options(
            "c",
            Arc::new(Collector {
                received: Arc::new(AsyncMutex::new(Vec::new())),
            }),
            &config,
            no_metrics(),
        );

        a.connect_queue("outbox", &b, "inbox", false, true).await.unwrap();
        let err = a
            .connect_queue("outbox", &c, "inbox", false, true)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::QueueConnected { .. }));
    }
}
