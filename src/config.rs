// src/config.rs

//! Manages gateway configuration: loading, derived values, and validation.

use crate::core::object::Transform;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// The top-level configuration for the gateway process.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Log level for the tracing subscriber (overridable with `RUST_LOG`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Optional placeholder image rendered through the requested transform
    /// chain when the real result cannot be produced.
    #[serde(default)]
    pub placeholder: Option<PlaceholderConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Per-status response header overrides applied to outgoing responses.
    #[serde(default)]
    pub headers: Vec<HeaderOverride>,
    /// Buckets served by this gateway, keyed by the first path segment.
    #[serde(default)]
    pub buckets: HashMap<String, BucketConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Listener and request admission settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// The total budget for one request, from accept to response.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Capacity of the dispatcher work queue. Enqueueing blocks when full.
    #[serde(default = "default_queue_len")]
    pub queue_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout: default_request_timeout(),
            queue_len: default_queue_len(),
        }
    }
}

impl ServerConfig {
    /// How long a single-flight waiter may wait for the owner's broadcast
    /// before falling back to its own computation. Kept one second below the
    /// request budget so the fallback still has time to respond.
    pub fn lock_timeout(&self) -> Duration {
        self.request_timeout
            .saturating_sub(Duration::from_secs(1))
            .max(Duration::from_millis(100))
    }
}

fn default_listen() -> SocketAddr {
    "127.0.0.1:8080".parse().expect("valid default listen address")
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_queue_len() -> usize {
    256
}

/// In-memory response cache settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached responses; LRU eviction beyond this.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_success_ttl", with = "humantime_serde")]
    pub success_ttl: Duration,
    #[serde(default = "default_placeholder_ttl", with = "humantime_serde")]
    pub placeholder_ttl: Duration,
    #[serde(default = "default_error_ttl", with = "humantime_serde")]
    pub error_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            success_ttl: default_success_ttl(),
            placeholder_ttl: default_placeholder_ttl(),
            error_ttl: default_error_ttl(),
        }
    }
}

fn default_cache_max_entries() -> usize {
    1024
}
fn default_success_ttl() -> Duration {
    Duration::from_secs(120)
}
fn default_placeholder_ttl() -> Duration {
    Duration::from_secs(600)
}
fn default_error_ttl() -> Duration {
    Duration::from_secs(60)
}

/// Image processing limits.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProcessingConfig {
    /// Maximum number of concurrent engine invocations.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Deadline for the fire-and-forget storage writeback of a processed
    /// image. Independent of the client's request deadline.
    #[serde(default = "default_writeback_timeout", with = "humantime_serde")]
    pub writeback_timeout: Duration,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            writeback_timeout: default_writeback_timeout(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_writeback_timeout() -> Duration {
    Duration::from_secs(30)
}

/// The processing service invoked for transform chains.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_engine_url")]
    pub url: Url,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
        }
    }
}

fn default_engine_url() -> Url {
    Url::parse("http://127.0.0.1:9100/process").expect("valid default engine url")
}

/// The fallback image served (through the requested transform chain) when a
/// request fails.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlaceholderConfig {
    /// Identifier mixed into placeholder cache keys.
    pub source: String,
    /// Path of the placeholder image, loaded into memory at startup.
    pub path: PathBuf,
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8878
}

/// Response header values forced onto responses with matching status codes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeaderOverride {
    pub status_codes: Vec<u16>,
    pub values: HashMap<String, String>,
}

/// How a bucket turns request URLs into transform chains.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransformStrategy {
    /// Only named presets in the URL path are recognized.
    Presets,
    /// Only query-string transforms are recognized.
    #[default]
    Query,
    /// Presets are tried first; if the path matches no preset, the query
    /// string is consulted.
    PresetsQuery,
}

/// A single bucket served by the gateway.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BucketConfig {
    #[serde(default)]
    pub strategy: TransformStrategy,
    /// Whether serving a cached/stored derived image requires a successful
    /// HEAD of its parent first.
    #[serde(default)]
    pub check_parent: bool,
    /// Named server-side transform chains, selected by URL path segment.
    #[serde(default)]
    pub presets: HashMap<String, PresetConfig>,
    pub storage: BucketStorageConfig,
}

/// A named, server-side-defined transform chain.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PresetConfig {
    pub operations: Vec<Transform>,
}

/// Storage backends for a bucket. Derived artifacts go to `transforms`,
/// falling back to `basic` when it is not set.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BucketStorageConfig {
    pub basic: StorageBackendConfig,
    #[serde(default)]
    pub transforms: Option<StorageBackendConfig>,
}

/// A single storage backend definition.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StorageBackendConfig {
    Filesystem { root_path: PathBuf },
    Memory,
    Http { base_url: Url },
}

impl Config {
    /// Loads and validates a configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.server.queue_len == 0 {
            return Err(anyhow!("server.queue_len must be greater than zero"));
        }
        if self.cache.max_entries == 0 {
            return Err(anyhow!("cache.max_entries must be greater than zero"));
        }
        if self.processing.concurrency == 0 {
            return Err(anyhow!("processing.concurrency must be greater than zero"));
        }
        if self.server.request_timeout <= Duration::from_secs(1) {
            return Err(anyhow!(
                "server.request_timeout must be greater than one second (the lock timeout is derived from it)"
            ));
        }
        if self.buckets.is_empty() {
            return Err(anyhow!("at least one bucket must be configured"));
        }
        for (name, bucket) in &self.buckets {
            if name.is_empty() || name.contains('/') {
                return Err(anyhow!("invalid bucket name '{name}'"));
            }
            if bucket.strategy != TransformStrategy::Query && bucket.presets.is_empty() {
                return Err(anyhow!(
                    "bucket '{name}' uses a preset strategy but defines no presets"
                ));
            }
            for (preset_name, preset) in &bucket.presets {
                if preset.operations.is_empty() {
                    return Err(anyhow!(
                        "preset '{preset_name}' in bucket '{name}' has no operations"
                    ));
                }
            }
        }
        if let Some(placeholder) = &self.placeholder {
            if placeholder.source.is_empty() {
                return Err(anyhow!("placeholder.source must not be empty"));
            }
            if !placeholder.path.is_file() {
                return Err(anyhow!(
                    "placeholder.path '{}' is not a readable file",
                    placeholder.path.display()
                ));
            }
        }
        Ok(())
    }
}
