//! # Configuration System
//!
//! Explicit configuration for the orchestration core, constructed once at
//! process start and passed by reference into the orchestrator and clients.
//! Values come from serde defaults overridden by `PODCAST_`-prefixed
//! environment variables (e.g. `PODCAST_DATABASE__URL`,
//! `PODCAST_STAGES__VOICE_URL`).

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::defaults;
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub database: DatabaseConfig,
    pub http_client: HttpClientConfig,
    pub idempotency: IdempotencyConfig,
    pub stages: StageEndpoints,
    pub web: WebConfig,
    pub ui_updates: UiUpdateConfig,
}

impl OrchestratorConfig {
    /// Load configuration from the environment.
    pub fn load() -> OrchestrationResult<Self> {
        let settings = Config::builder()
            .add_source(Environment::with_prefix("PODCAST").separator("__"))
            .build()
            .map_err(|e| OrchestrationError::Configuration {
                config_source: "environment".to_string(),
                reason: e.to_string(),
            })?;
        settings
            .try_deserialize()
            .map_err(|e| OrchestrationError::Configuration {
                config_source: "environment".to_string(),
                reason: e.to_string(),
            })
    }
}

/// Database connection and pooling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/podcast_core".to_string(),
            max_connections: 10,
            connect_timeout_seconds: 30,
        }
    }
}

/// Submit/poll tuning for the collaborator client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
}

impl HttpClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Exponential backoff delay for the given 0-based attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.backoff_factor * 2f64.powi(attempt as i32))
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_retries: defaults::MAX_RETRIES,
            backoff_factor: defaults::BACKOFF_FACTOR,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            poll_timeout_ms: defaults::POLL_TIMEOUT_MS,
        }
    }
}

/// Idempotency lock tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub lock_timeout_seconds: u64,
}

impl IdempotencyConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            lock_timeout_seconds: defaults::LOCK_TIMEOUT_SECONDS,
        }
    }
}

/// Submit URLs for the stage collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageEndpoints {
    pub harvest_url: String,
    pub script_url: String,
    pub voice_url: String,
    pub notify_url: String,
    pub topic_discovery_url: String,
    pub snippet_url: String,
}

impl Default for StageEndpoints {
    fn default() -> Self {
        Self {
            harvest_url: "http://localhost:5001/harvest".to_string(),
            script_url: "http://localhost:5002/weave_script".to_string(),
            voice_url: "http://localhost:5003/synthesize".to_string(),
            notify_url: "http://localhost:5004/notify_stream".to_string(),
            topic_discovery_url: "http://localhost:5005/discover_topics".to_string(),
            snippet_url: "http://localhost:5006/craft_snippet".to_string(),
        }
    }
}

/// REST API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Optional UI push channel endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UiUpdateConfig {
    pub endpoint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.idempotency.lock_timeout_seconds, 300);
        assert_eq!(config.http_client.max_retries, 3);
        assert!(config.stages.harvest_url.starts_with("http://"));
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let config = HttpClientConfig {
            backoff_factor: 0.5,
            ..Default::default()
        };
        assert_eq!(config.backoff_delay(0), Duration::from_millis(500));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(2000));
    }
}
