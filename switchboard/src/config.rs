use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};

/// Global knobs that tune runtime behaviour. All fields carry defaults so a
/// `Director` can be built with zero configuration (queue capacity 500,
/// 1-second metrics cadence, metrics generation off by default).
///
/// Layered: `RuntimeConfig::default()` → optional TOML file → `SWITCHBOARD_*`
/// environment overrides, in that order (`RuntimeConfig::load`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity applied to queues the `Director` creates on behalf of the
    /// actors it registers. `0` means unbounded.
    pub default_queue_capacity: usize,
    /// How often the metric emitter snapshots each outbound queue.
    #[serde(with = "humantime_serde")]
    pub metrics_frequency: Duration,
    /// Default for `Actor::generate_metrics` on Director-registered actors.
    pub generate_metrics_default: bool,
    /// Sleep interval before a `SupervisedPool` worker is respawned.
    #[serde(with = "humantime_serde")]
    pub restart_interval: Duration,
    /// Timeout passed to `Queue::get` inside the consume loop.
    #[serde(with = "humantime_serde")]
    pub get_timeout: Duration,
    /// How long `Director::stop` waits for a `SupervisedPool::join` before
    /// giving up and logging a warning.
    #[serde(with = "humantime_serde")]
    pub shutdown_join_timeout: Duration,
    /// Namespace string embedded in every `MetricRecord` (field 2 of the
    /// wire tuple). Deployment-specific identity, not a protocol constant.
    pub metric_namespace: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_queue_capacity: 500,
            metrics_frequency: Duration::from_secs(1),
            generate_metrics_default: false,
            restart_interval: Duration::from_secs(1),
            get_timeout: Duration::from_secs(10),
            shutdown_join_timeout: Duration::from_secs(30),
            metric_namespace: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Loads defaults, merges a TOML file if `path` is given and exists,
    /// then applies `SWITCHBOARD_*` environment overrides (`.env` is read
    /// first via `dotenvy` so local development doesn't need exported
    /// shell variables).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                let raw = std::fs::read_to_string(path)?;
                config = toml::from_str(&raw)?;
            }
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("SWITCHBOARD_DEFAULT_QUEUE_CAPACITY") {
            self.default_queue_capacity = v
                .parse()
                .map_err(|_| SwitchboardError::Config(format!("invalid capacity: {v}")))?;
        }
        if let Ok(v) = std::env::var("SWITCHBOARD_METRICS_FREQUENCY") {
            self.metrics_frequency = humantime::parse_duration(&v)
                .map_err(|e| SwitchboardError::Config(e.to_string()))?;
        }
        if let Ok(v) = std::env::var("SWITCHBOARD_GENERATE_METRICS") {
            self.generate_metrics_default = v
                .parse()
                .map_err(|_| SwitchboardError::Config(format!("invalid bool: {v}")))?;
        }
        if let Ok(v) = std::env::var("SWITCHBOARD_RESTART_INTERVAL") {
            self.restart_interval = humantime::parse_duration(&v)
                .map_err(|e| SwitchboardError::Config(e.to_string()))?;
        }
        if let Ok(v) = std::env::var("SWITCHBOARD_METRIC_NAMESPACE") {
            self.metric_namespace = v;
        }
        Ok(())
    }
}

/// `serde_with`-style helper module so `Duration` fields can round-trip
/// through TOML as human-readable strings ("1s", "500ms") instead of a
/// nanosecond integer pair.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_director_baseline() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.default_queue_capacity, 500);
        assert_eq!(cfg.metrics_frequency, Duration::from_secs(1));
        assert!(!cfg.generate_metrics_default);
    }

    #[test]
    fn toml_round_trip_with_humantime_durations() {
        let cfg = RuntimeConfig {
            metrics_frequency: Duration::from_millis(250),
            ..RuntimeConfig::default()
        };
        let serialized = toml::to_string(&cfg).unwrap();
        let parsed: RuntimeConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.metrics_frequency, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn file_load_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.toml");
        std::fs::write(&path, "default_queue_capacity = 42\n").unwrap();
        let cfg = RuntimeConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.default_queue_capacity, 42);
        // untouched fields keep their defaults
        assert_eq!(cfg.metrics_frequency, Duration::from_secs(1));
    }
}
