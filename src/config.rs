//! Configuration types, built from environment variables.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default number of messages per external batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default body limit for transcript uploads (16 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// External classifier connection settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the extraction service, without trailing slash.
    pub base_url: String,
    /// Optional bearer token.
    pub api_key: Option<SecretString>,
    /// Budget for one `process_message` call.
    pub message_timeout: Duration,
    /// Budget for one `batch_process` call.
    pub batch_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            api_key: None,
            message_timeout: Duration::from_secs(30),
            batch_timeout: Duration::from_secs(60),
        }
    }
}

/// Orchestration settings for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Messages per external call. Never zero.
    pub batch_size: usize,
    /// Batches dispatched concurrently within one run. `1` is sequential.
    pub max_in_flight: usize,
    /// Budget for one single-message call.
    pub message_timeout: Duration,
    /// Budget for one batch call.
    pub batch_timeout: Duration,
    /// Optional deadline for a whole run.
    pub run_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: 1,
            message_timeout: Duration::from_secs(30),
            batch_timeout: Duration::from_secs(60),
            run_timeout: None,
        }
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Where normalized listings are posted, if anywhere.
    pub listing_store_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            listing_store_url: None,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Build config from `ROOMSCOUT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Unparseable numbers and zero timeouts fall back to their defaults; a
    /// zero batch size or zero concurrency is rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let non_empty = |key: &str| lookup(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let defaults = Self::default();

        let base_url = non_empty("ROOMSCOUT_CLASSIFIER_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.classifier.base_url);
        let api_key = non_empty("ROOMSCOUT_CLASSIFIER_API_KEY").map(SecretString::from);

        let message_timeout = parsed("ROOMSCOUT_MESSAGE_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.pipeline.message_timeout);
        let batch_timeout = parsed("ROOMSCOUT_BATCH_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.pipeline.batch_timeout);
        let run_timeout = parsed("ROOMSCOUT_RUN_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let batch_size = match parsed("ROOMSCOUT_BATCH_SIZE") {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "ROOMSCOUT_BATCH_SIZE".into(),
                    message: "must be at least 1".into(),
                });
            }
            Some(n) => n as usize,
            None => defaults.pipeline.batch_size,
        };

        let max_in_flight = match parsed("ROOMSCOUT_MAX_IN_FLIGHT") {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "ROOMSCOUT_MAX_IN_FLIGHT".into(),
                    message: "must be at least 1".into(),
                });
            }
            Some(n) => n as usize,
            None => defaults.pipeline.max_in_flight,
        };

        let port = lookup("ROOMSCOUT_PORT")
            .and_then(|s| s.trim().parse::<u16>().ok())
            .unwrap_or(defaults.server.port);
        let max_upload_bytes = parsed("ROOMSCOUT_MAX_UPLOAD_BYTES")
            .map(|n| n as usize)
            .unwrap_or(defaults.server.max_upload_bytes);
        let listing_store_url = non_empty("ROOMSCOUT_LISTING_STORE_URL");

        Ok(Self {
            classifier: ClassifierConfig {
                base_url,
                api_key,
                message_timeout,
                batch_timeout,
            },
            pipeline: PipelineConfig {
                batch_size,
                max_in_flight,
                message_timeout,
                batch_timeout,
                run_timeout,
            },
            server: ServerConfig {
                port,
                max_upload_bytes,
                listing_store_url,
            },
        })
    }
}
