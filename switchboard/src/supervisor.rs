use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// A pool of cooperatively scheduled worker tasks with restart-on-failure.
///
/// Each spawned worker has a stable identity (its `name` and the closure
/// that produces its body) so restarts invoke the same function/args.
/// Transient per-event consume fan-outs spawn with `restart: false`.
///
/// Backed by a `JoinSet` rather than a plain `Vec<JoinHandle>`: a
/// long-running actor spawns one transient worker per consumed event, and a
/// `Vec` only ever reaps on `join()` (i.e. at shutdown), so it would grow
/// without bound for the life of the actor. `spawn` reaps already-finished
/// workers from the set every time it's called, keeping the set's size
/// bounded by in-flight work rather than total work done.
pub struct SupervisedPool {
    name: String,
    restart_interval: Duration,
    handles: Mutex<JoinSet<()>>,
}

impl SupervisedPool {
    pub fn new(name: impl Into<String>, restart_interval: Duration) -> Self {
        Self {
            name: name.into(),
            restart_interval,
            handles: Mutex::new(JoinSet::new()),
        }
    }

    /// Begins a worker executing `make_task()`. If the produced future
    /// resolves to `Err` and `restart` is true, the error is logged and the
    /// worker is respawned (by calling `make_task` again) after
    /// `restart_interval`. A worker that finishes `Ok(())`, or that fails
    /// with `restart: false`, is allowed to exit for good.
    pub async fn spawn<F, Fut>(&self, worker_name: impl Into<String>, restart: bool, make_task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let pool_name = self.name.clone();
        let worker_name = worker_name.into();
        let restart_interval = self.restart_interval;

        let mut handles = self.handles.lock().await;
        // Reap whatever's already finished before adding one more. Without
        // this, a long-running actor spawning one transient worker per
        // consumed event would grow this set without bound.
        while handles.try_join_next().is_some() {}

        let _ = handles.spawn(async move {
            loop {
                match make_task().await {
                    Ok(()) => {
                        tracing::debug!(pool = %pool_name, worker = %worker_name, "worker exited normally");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(pool = %pool_name, worker = %worker_name, error = %err, "worker terminated");
                        if !restart {
                            break;
                        }
                        tokio::time::sleep(restart_interval).await;
                        tracing::info!(pool = %pool_name, worker = %worker_name, "restarting worker");
                    }
                }
            }
        });
    }

    /// Blocks until every worker spawned so far has exited, including
    /// workers a still-running worker spawns in the meantime (e.g. a
    /// consumer loop that fans out one-shot tasks while draining). Each
    /// round swaps in a fresh `JoinSet` before awaiting so a concurrent
    /// `spawn` (from a worker this call is already awaiting) never contends
    /// for the same lock `join` holds across an `.await`; repeats until a
    /// round finds nothing new.
    pub async fn join(&self) {
        loop {
            let mut batch = {
                let mut guard = self.handles.lock().await;
                std::mem::replace(&mut *guard, JoinSet::new())
            };
            if batch.is_empty() {
                break;
            }
            while let Some(result) = batch.join_next().await {
                if let Err(err) = result {
                    tracing::warn!(pool = %self.name, error = %err, "worker task panicked");
                }
            }
        }
    }

    pub async fn worker_count(&self) -> usize {
        self.handles.lock().await.len()
    }
}
