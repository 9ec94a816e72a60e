use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::actor::{Actor, ActorOptions, Consumer};
use crate::config::RuntimeConfig;
use crate::error::{Result, SwitchboardError};
use crate::sinks::NullSink;

/// Owns a named collection of actors plus the three reserved sink roles
/// (log, metric, failed) every actor's reserved queues fan out to at
/// `start()`. All three default to a `NullSink` actor until replaced by
/// `register_log_actor`/`register_metric_actor`/`register_failed_actor`.
pub struct Director {
    actors: RwLock<HashMap<String, Arc<Actor>>>,
    log_actor: RwLock<Arc<Actor>>,
    metric_actor: RwLock<Arc<Actor>>,
    failed_actor: RwLock<Arc<Actor>>,
    log_registered: AtomicBool,
    failed_registered: AtomicBool,
    config: RuntimeConfig,
    running: AtomicBool,
    shutdown_token: CancellationToken,
}

impl Director {
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        let log_actor = Actor::new("null_logs", Arc::new(NullSink), &config);
        let metric_actor = Actor::new("null_metrics", Arc::new(NullSink), &config);
        let failed_actor = Actor::new("null_faileds", Arc::new(NullSink), &config);
        Arc::new(Self {
            actors: RwLock::new(HashMap::new()),
            log_actor: RwLock::new(log_actor),
            metric_actor: RwLock::new(metric_actor),
            failed_actor: RwLock::new(failed_actor),
            log_registered: AtomicBool::new(false),
            failed_registered: AtomicBool::new(false),
            config,
            running: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
        })
    }

    pub async fn get_actor(&self, name: &str) -> Option<Arc<Actor>> {
        self.actors.read().await.get(name).cloned()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn build_actor(&self, name: &str, consumer: Arc<dyn Consumer>) -> Arc<Actor> {
        Actor::with_options(
            name,
            consumer,
            &self.config,
            ActorOptions {
                capacity: self.config.default_queue_capacity,
                generate_metrics: self.config.generate_metrics_default,
                blocking_consume: false,
            },
        )
    }

    /// Builds and registers an actor under `name`, using `build` to produce
    /// its `Consumer`. A `build` failure becomes `ModuleInitFailure`,
    /// wrapping whatever error the constructor raised.
    pub async fn register_actor<F>(&self, name: impl Into<String>, build: F) -> Result<Arc<Actor>>
    where
        F: FnOnce() -> Result<Arc<dyn Consumer>>,
    {
        let name = name.into();
        let consumer = build().map_err(|err| SwitchboardError::ModuleInitFailure {
            name: name.clone(),
            reason: err.to_string(),
        })?;
        let actor = self.build_actor(&name, consumer);
        self.actors.write().await.insert(name, Arc::clone(&actor));
        Ok(actor)
    }

    pub async fn register_log_actor<F>(&self, name: impl Into<String>, build: F) -> Result<Arc<Actor>>
    where
        F: FnOnce() -> Result<Arc<dyn Consumer>>,
    {
        let name = name.into();
        let consumer = build().map_err(|err| SwitchboardError::ModuleInitFailure {
            name: name.clone(),
            reason: err.to_string(),
        })?;
        let actor = self.build_actor(&name, consumer);
        *self.log_actor.write().await = Arc::clone(&actor);
        self.log_registered.store(true, Ordering::SeqCst);
        Ok(actor)
    }

    pub async fn register_metric_actor<F>(&self, name: impl Into<String>, build: F) -> Result<Arc<Actor>>
    where
        F: FnOnce() -> Result<Arc<dyn Consumer>>,
    {
        let name = name.into();
        let consumer = build().map_err(|err| SwitchboardError::ModuleInitFailure {
            name: name.clone(),
            reason: err.to_string(),
        })?;
        let actor = self.build_actor(&name, consumer);
        *self.metric_actor.write().await = Arc::clone(&actor);
        Ok(actor)
    }

    pub async fn register_failed_actor<F>(&self, name: impl Into<String>, build: F) -> Result<Arc<Actor>>
    where
        F: FnOnce() -> Result<Arc<dyn Consumer>>,
    {
        let name = name.into();
        let consumer = build().map_err(|err| SwitchboardError::ModuleInitFailure {
            name: name.clone(),
            reason: err.to_string(),
        })?;
        let actor = self.build_actor(&name, consumer);
        *self.failed_actor.write().await = Arc::clone(&actor);
        self.failed_registered.store(true, Ordering::SeqCst);
        Ok(actor)
    }

    /// Wires `source`'s outbound queue to `destination`'s inbound queue.
    /// Queue names default symmetrically: the destination's inbound name
    /// defaults to the source actor's own name, and the source's outbound
    /// name defaults to the destination actor's name.
    pub async fn connect_queue(
        &self,
        source_actor: &str,
        source_queue_name: Option<&str>,
        destination_actor: &str,
        destination_queue_name: Option<&str>,
        error_queue: bool,
    ) -> Result<()> {
        let source = self
            .get_actor(source_actor)
            .await
            .ok_or_else(|| SwitchboardError::NoSuchModule { name: source_actor.to_string() })?;
        let destination = self
            .get_actor(destination_actor)
            .await
            .ok_or_else(|| SwitchboardError::NoSuchModule { name: destination_actor.to_string() })?;

        let dest_queue_name = destination_queue_name.unwrap_or(source_actor).to_string();
        let src_queue_name = source_queue_name.unwrap_or(destination_actor).to_string();

        if error_queue {
            source
                .connect_error_queue(&src_queue_name, &destination, &dest_queue_name, true)
                .await
        } else {
            source
                .connect_queue(&src_queue_name, &destination, &dest_queue_name, false, true)
                .await
        }
    }

    pub async fn connect_error_queue(
        &self,
        source_actor: &str,
        source_queue_name: Option<&str>,
        destination_actor: &str,
        destination_queue_name: Option<&str>,
    ) -> Result<()> {
        self.connect_queue(source_actor, source_queue_name, destination_actor, destination_queue_name, true)
            .await
    }

    /// Wires every actor's reserved `logs`/`metrics`/`failed` outbound to
    /// the corresponding sink's `inbox`, with `check_existing = false`
    /// (the same sink legitimately receives from many actors). If no
    /// failed sink was registered but a log sink was, the failed role
    /// aliases to the log actor by reference rather than by wiring.
    async fn setup_default_connections(&self) -> Result<()> {
        let log_actor = self.log_actor.read().await.clone();

        if !self.failed_registered.load(Ordering::SeqCst) && self.log_registered.load(Ordering::SeqCst) {
            *self.failed_actor.write().await = Arc::clone(&log_actor);
        } else {
            let failed_actor = self.failed_actor.read().await.clone();
            failed_actor
                .connect_queue("logs", &log_actor, "inbox", false, false)
                .await?;
        }

        let failed_actor = self.failed_actor.read().await.clone();
        let metric_actor = self.metric_actor.read().await.clone();

        for actor in self.actors.read().await.values() {
            actor.connect_queue("logs", &log_actor, "inbox", false, false).await?;
            actor.connect_queue("metrics", &metric_actor, "inbox", false, false).await?;
            actor.connect_queue("failed", &failed_actor, "inbox", false, false).await?;
        }

        log_actor.connect_queue("logs", &log_actor, "inbox", false, false).await?;
        metric_actor.connect_queue("logs", &log_actor, "inbox", false, false).await?;

        Ok(())
    }

    /// Starts every registered actor (user actors first, then the sinks),
    /// installs SIGINT/SIGTERM handling that calls `stop`, and optionally
    /// blocks until `stop()` is called.
    pub async fn start(self: &Arc<Self>, block: bool) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.setup_default_connections().await?;

        let user_actors: Vec<Arc<Actor>> = self.actors.read().await.values().cloned().collect();
        join_all(user_actors.iter().map(|actor| actor.start())).await;

        let log_actor = self.log_actor.read().await.clone();
        let metric_actor = self.metric_actor.read().await.clone();
        let failed_actor = self.failed_actor.read().await.clone();

        log_actor.start().await;
        metric_actor.start().await;
        if !Arc::ptr_eq(&failed_actor, &log_actor) {
            failed_actor.start().await;
        }

        self.install_signal_handlers();

        if block {
            self.block().await;
        }
        Ok(())
    }

    fn install_signal_handlers(self: &Arc<Self>) {
        let director = Arc::clone(self);
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            tracing::warn!("received shutdown signal");
            director.stop().await;
        });
    }

    /// Blocks until `stop()` has been called.
    pub async fn block(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// Stops all user actors first, then the metric/failed/log sinks in
    /// that order so downstream sinks keep draining while upstream actors
    /// are still flushing their reserved queues into them.
    pub async fn stop(&self) {
        self.shutdown_token.cancel();

        let user_actors: Vec<Arc<Actor>> = self.actors.read().await.values().cloned().collect();
        join_all(user_actors.iter().map(|actor| actor.stop())).await;

        let log_actor = self.log_actor.read().await.clone();
        let metric_actor = self.metric_actor.read().await.clone();
        let failed_actor = self.failed_actor.read().await.clone();

        metric_actor.stop().await;
        if !Arc::ptr_eq(&failed_actor, &log_actor) {
            failed_actor.stop().await;
        }
        log_actor.stop().await;

        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::queue::Queue;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap as Map;
    use tokio::sync::Mutex as AsyncMutex;

    struct Echo;

    #[async_trait]
    impl Consumer for Echo {
        async fn consume(&self, event: Event, _origin: &str, _origin_queue: Arc<Queue>, actor: &Actor) -> Result<()> {
            actor.send_event(event, None, None).await
        }
    }

    struct Recorder {
        seen: Arc<AsyncMutex<Vec<Value>>>,
    }

    #[async_trait]
    impl Consumer for Recorder {
        async fn consume(&self, event: Event, _origin: &str, _origin_queue: Arc<Queue>, _actor: &Actor) -> Result<()> {
            self.seen.lock().await.push(event.data);
            Ok(())
        }
    }

    fn no_metrics_config() -> RuntimeConfig {
        RuntimeConfig {
            generate_metrics_default: false,
            default_queue_capacity: 0,
            ..RuntimeConfig::default()
        }
    }

    #[tokio::test]
    async fn failed_queue_aliases_to_log_actor_when_no_failed_sink_registered() {
        let director = Director::new(no_metrics_config());
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        director
            .register_log_actor("log_sink", {
                let seen = Arc::clone(&seen);
                move || Ok(Arc::new(Recorder { seen }) as Arc<dyn Consumer>)
            })
            .await
            .unwrap();

        director
            .register_actor("worker", || Ok(Arc::new(Echo) as Arc<dyn Consumer>))
            .await
            .unwrap();

        director.start(false).await.unwrap();

        let worker = director.get_actor("worker").await.unwrap();
        let failed_queue = worker.get_reserved("failed").await.unwrap();
        let log_actor = director.get_actor("log_sink").await;
        assert!(log_actor.is_none()); // sink actors are not stored in `actors`

        failed_queue
            .put(Event::new(json!({"broke": true}), None, Map::new()))
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            loop {
                if !seen.lock().await.is_empty() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("log sink should receive the aliased failed event");

        assert_eq!(seen.lock().await[0]["broke"], json!(true));
        director.stop().await;
    }

    #[tokio::test]
    async fn unregistered_actor_name_is_rejected() {
        let director = Director::new(no_metrics_config());
        let err = director
            .connect_queue("ghost", None, "also_ghost", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::NoSuchModule { .. }));
    }
}
