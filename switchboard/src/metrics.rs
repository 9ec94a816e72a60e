use serde::Serialize;
use serde_json::{json, Value};

use crate::config::RuntimeConfig;
use crate::queue::QueueStats;

/// One data point emitted per `(actor, queue, stat)` triple on every metric
/// emitter tick: `(timestamp, namespace, hostname, metric, value, tag,
/// extra)`. `namespace` comes from `RuntimeConfig::metric_namespace` rather
/// than a hardcoded project name, and `hostname` is resolved once per
/// process rather than per record.
#[derive(Clone, Debug, Serialize)]
pub struct MetricRecord {
    pub timestamp: u64,
    pub namespace: String,
    pub hostname: String,
    pub metric: String,
    pub value: f64,
    pub tag: Option<String>,
    pub extra: Option<String>,
}

impl MetricRecord {
    /// Builds the record for one `(actor, queue, stat)` data point, with
    /// `metric` following the dotted naming `queue.<actor>.<queue>.<stat>`.
    pub fn new(
        timestamp: u64,
        config: &RuntimeConfig,
        actor: &str,
        queue: &str,
        stat: &str,
        value: f64,
    ) -> Self {
        Self {
            timestamp,
            namespace: config.metric_namespace.clone(),
            hostname: hostname(),
            metric: format!("queue.{actor}.{queue}.{stat}"),
            value,
            tag: None,
            extra: None,
        }
    }

    /// Expands one `QueueStats` snapshot into its four `MetricRecord`s
    /// (`size`, `capacity`, `total_in`, `total_out`), in the order
    /// `QueueStats::as_pairs` defines.
    pub fn from_queue_stats(
        timestamp: u64,
        config: &RuntimeConfig,
        actor: &str,
        queue: &str,
        stats: QueueStats,
    ) -> Vec<Self> {
        stats
            .as_pairs()
            .into_iter()
            .map(|(stat, value)| Self::new(timestamp, config, actor, queue, stat, value))
            .collect()
    }

    /// Renders as the JSON payload carried by the `Event` placed on the
    /// reserved `metrics` queue.
    pub fn to_event_data(&self) -> Value {
        json!({
            "timestamp": self.timestamp,
            "namespace": self.namespace,
            "hostname": self.hostname,
            "metric": self.metric,
            "value": self.value,
            "tag": self.tag,
            "extra": self.extra,
        })
    }
}

/// Resolves the real host name via `gethostname(2)` (through the `hostname`
/// crate), matching the original's `socket.gethostname()`. `HOSTNAME` is
/// usually a shell-only variable never exported into a process's
/// environment, so an env lookup would report `"localhost"` on most
/// non-containerized hosts.
fn hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueStats;

    #[test]
    fn metric_name_follows_dotted_convention() {
        let cfg = RuntimeConfig::default();
        let record = MetricRecord::new(0, &cfg, "my_actor", "inbox", "size", 3.0);
        assert_eq!(record.metric, "queue.my_actor.inbox.size");
        assert_eq!(record.namespace, cfg.metric_namespace);
    }

    #[test]
    fn queue_stats_expand_to_four_records() {
        let cfg = RuntimeConfig::default();
        let stats = QueueStats {
            size: 1,
            capacity: 500,
            total_in: 10,
            total_out: 9,
        };
        let records = MetricRecord::from_queue_stats(0, &cfg, "a", "outbox", stats);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].metric, "queue.a.outbox.size");
        assert_eq!(records[0].value, 1.0);
        assert_eq!(records[3].metric, "queue.a.outbox.total_out");
        assert_eq!(records[3].value, 9.0);
    }
}
