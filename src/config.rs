//! Runtime configuration.
//!
//! Loaded from TOML. Every field except `delivery.url` has a default:
//!
//! ```toml
//! target_type = "event"
//!
//! [delivery]
//! url = "http://localhost:48080/api/v1/event"
//! persist_on_failure = true
//! timeout_ms = 5000
//!
//! [store_forward]
//! enabled = true
//! interval_ms = 10000
//! max_retry_count = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::decode::TargetType;
use crate::envelope::CONTENT_TYPE_JSON;
use crate::retry::RetryPolicy;

/// Error returned for invalid or unreadable configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("'{0}' is not a known target type")]
    UnknownTargetType(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to build delivery transport: {0}")]
    Transport(#[source] reqwest::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Name of the type payloads are decoded into (`event`, `json`, `raw`).
    #[serde(default = "default_target_type")]
    pub target_type: String,

    /// Delivery sender settings. No sender is built when absent.
    #[serde(default)]
    pub delivery: Option<DeliveryConfig>,

    #[serde(default)]
    pub store_forward: StoreForwardConfig,

    /// Tracing filter used when `RUST_LOG` is unset.
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            target_type: default_target_type(),
            delivery: None,
            store_forward: StoreForwardConfig::default(),
            log_filter: None,
        }
    }
}

impl RuntimeConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML config text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve_target_type()?;
        if let Some(delivery) = &self.delivery {
            delivery.validate()?;
        }
        self.store_forward.validate()?;

        let persisting = self
            .delivery
            .as_ref()
            .is_some_and(|d| d.persist_on_failure);
        if self.store_forward.enabled && !persisting {
            return Err(ConfigError::Invalid(
                "store_forward requires delivery.persist_on_failure".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve `target_type` to a decoder.
    pub fn resolve_target_type(&self) -> Result<TargetType, ConfigError> {
        TargetType::from_name(&self.target_type)
    }
}

/// Delivery sender settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub url: String,

    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Keep failed payloads for redelivery (default: false).
    #[serde(default)]
    pub persist_on_failure: bool,

    /// Per-send deadline in milliseconds (default: 30000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Continue the pipeline with the response body (default: false).
    #[serde(default)]
    pub pass_response: bool,

    /// Reuse idle connections (default: true).
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,

    #[serde(default)]
    pub auth_header: Option<String>,

    #[serde(default)]
    pub auth_value: Option<String>,
}

impl DeliveryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: default_content_type(),
            persist_on_failure: false,
            timeout_ms: default_timeout_ms(),
            pass_response: false,
            keep_alive: default_keep_alive(),
            auth_header: None,
            auth_value: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "delivery.url must be an http(s) URL, got '{}'",
                self.url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "delivery.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.auth_header.is_some() != self.auth_value.is_some() {
            return Err(ConfigError::Invalid(
                "delivery.auth_header and delivery.auth_value must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

/// Store-and-forward settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreForwardConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Time between passes over the retry store (default: 10000).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Reschedules before a record is discarded (default: 10, 0 = discard after one failed resend).
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,

    /// Records claimed per pass (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay before the first reattempt, doubling afterwards (default: 1000).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on the reattempt delay (default: 300000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for StoreForwardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_interval_ms(),
            max_retry_count: default_max_retry_count(),
            batch_size: default_batch_size(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl StoreForwardConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if self.max_retry_count == 0 {
            return RetryPolicy::None;
        }
        RetryPolicy::Exponential {
            max_attempts: self.max_retry_count,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "store_forward.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "store_forward.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(
                "store_forward.initial_delay_ms exceeds max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_target_type() -> String {
    "event".to_string()
}

fn default_content_type() -> String {
    CONTENT_TYPE_JSON.to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_keep_alive() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_max_retry_count() -> u32 {
    10
}

fn default_batch_size() -> usize {
    100
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    300_000
}
