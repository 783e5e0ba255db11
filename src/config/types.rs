use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub posters: PostersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Display name injected into the configured manifest.
    #[serde(default = "default_app_name")]
    pub name: String,
}

fn default_app_name() -> String {
    "Cinefeed Catalog".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// Cadence between successful refresh cycles, in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Delay after a failed cycle before the loop continues, in seconds.
    #[serde(default = "default_failure_reschedule_secs")]
    pub failure_reschedule_secs: u64,

    /// Attempts per cycle before the cycle reports failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base exponential-backoff delay between attempts, in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Catalog keys committed per store chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// How often the supervisor checks scheduler liveness, in seconds.
    #[serde(default = "default_supervisor_interval_secs")]
    pub supervisor_interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    300
}
fn default_failure_reschedule_secs() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    60
}
fn default_chunk_size() -> usize {
    100
}
fn default_supervisor_interval_secs() -> u64 {
    60
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            failure_reschedule_secs: default_failure_reschedule_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            chunk_size: default_chunk_size(),
            supervisor_interval_secs: default_supervisor_interval_secs(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn failure_reschedule(&self) -> Duration {
        Duration::from_secs(self.failure_reschedule_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn supervisor_interval(&self) -> Duration {
        Duration::from_secs(self.supervisor_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL of the upstream catalog aggregation service.
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:9000".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostersConfig {
    /// Base URL of the poster provider; the public API when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bound on concurrent enrichment work.
    #[serde(default = "default_poster_workers")]
    pub workers: usize,
}

fn default_poster_workers() -> usize {
    8
}

impl Default for PostersConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            workers: default_poster_workers(),
        }
    }
}
