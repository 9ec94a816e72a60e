pub mod actor;
pub mod config;
pub mod director;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod sinks;
pub mod supervisor;

pub use actor::{Actor, ActorOptions, Consumer};
pub use config::RuntimeConfig;
pub use director::Director;
pub use error::{Result, SwitchboardError};
pub use event::{Event, EventId};
pub use metrics::MetricRecord;
pub use pool::QueuePool;
pub use queue::{Queue, QueueStats};
pub use sinks::{NullSink, TracingLogSink};
pub use supervisor::SupervisedPool;

/// Installs a `tracing` subscriber reading `RUST_LOG` (falling back to
/// `info`), matching the logging bootstrap every binary built on this
/// crate is expected to call once at process startup.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
