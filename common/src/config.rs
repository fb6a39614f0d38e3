// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub redis: RedisConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Root prefix of every key
    pub namespace: String,
    /// Lifetime of per-worker records (started, status, per-worker counters).
    /// Must outlive one job plus one poll interval.
    pub record_ttl_seconds: u64,
}

impl QueueConfig {
    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Queues polled in priority order
    #[serde(default)]
    pub queues: Vec<String>,
    pub poll_interval_ms: u64,
    /// Host part of the worker identity; falls back to $HOSTNAME
    #[serde(default)]
    pub hostname: Option<String>,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Settings::default();

        let builder = Config::builder()
            // Built-in defaults so every file layer is optional
            .set_default("redis.url", defaults.redis.url)?
            .set_default(
                "redis.connect_timeout_seconds",
                defaults.redis.connect_timeout_seconds,
            )?
            .set_default("queue.namespace", defaults.queue.namespace)?
            .set_default("queue.record_ttl_seconds", defaults.queue.record_ttl_seconds)?
            .set_default("worker.queues", Vec::<String>::new())?
            .set_default("worker.poll_interval_ms", defaults.worker.poll_interval_ms)?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .set_default("observability.json_logs", defaults.observability.json_logs)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("RESQ")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("worker.queues")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.redis.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.redis.connect_timeout_seconds == 0 {
            return Err("Redis connect_timeout_seconds must be greater than 0".to_string());
        }

        if self.queue.namespace.is_empty() {
            return Err("Queue namespace cannot be empty".to_string());
        }
        if self.queue.namespace.contains(crate::keys::DELIMITER) {
            return Err(format!(
                "Queue namespace cannot contain '{}'",
                crate::keys::DELIMITER
            ));
        }
        if self.queue.record_ttl_seconds == 0 {
            return Err("Queue record_ttl_seconds must be greater than 0".to_string());
        }

        if self.worker.poll_interval_ms == 0 {
            return Err("Worker poll_interval_ms must be greater than 0".to_string());
        }
        if self.worker.queues.iter().any(|q| q.trim().is_empty()) {
            return Err("Worker queue names cannot be empty".to_string());
        }
        // A status record must survive at least one full poll cycle.
        if self.queue.record_ttl() <= self.worker.poll_interval() {
            return Err(
                "Queue record_ttl_seconds must be longer than worker poll_interval_ms".to_string(),
            );
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            queue: QueueConfig {
                namespace: crate::keys::DEFAULT_NAMESPACE.to_string(),
                record_ttl_seconds: 3600,
            },
            worker: WorkerConfig {
                queues: Vec::new(),
                poll_interval_ms: 5000,
                hostname: None,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
                metrics_port: None,
            },
        }
    }
}
