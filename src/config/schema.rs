//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Origin value that matches every requesting origin.
pub const WILDCARD_ORIGIN: &str = "*";

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Cross-cutting request pipeline settings.
    pub pipeline: PipelineConfig,

    /// Detection engine settings.
    pub engine: EngineConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8300").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8300".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Maximum buffered response body size in bytes.
    pub max_response_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,      // 1MB
            max_response_bytes: 8 * 1024 * 1024, // 8MB
        }
    }
}

/// Settings for the request pipeline stages.
///
/// Loaded once before the process state exists and read-only afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Origins permitted to receive cross-origin responses. `"*"` matches any
    /// origin and is only accepted when credentials are disabled.
    pub allowed_origins: BTreeSet<String>,

    /// Whether cross-origin responses may carry credentials.
    pub credentials_allowed: bool,

    /// Responses smaller than this are never compressed.
    pub compression_threshold_bytes: usize,

    /// Seconds browsers may cache a preflight answer.
    pub preflight_max_age_secs: u64,
}

impl PipelineConfig {
    /// Returns true if the wildcard origin is configured.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.contains(WILDCARD_ORIGIN)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allowed_origins: BTreeSet::new(),
            credentials_allowed: true,
            compression_threshold_bytes: 1000,
            preflight_max_age_secs: 600,
        }
    }
}

/// Detection engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum number of samples a trajectory must carry.
    pub min_samples: usize,

    /// Neighbour window used to smooth the path (odd, >= 3).
    pub smoothing_window: usize,

    /// Interval coefficient of variation below which timing is "too regular".
    pub regularity_threshold: f64,

    /// Normalised path error below which movement is "too smooth".
    pub error_threshold: f64,

    /// Optional TOML profile overriding the thresholds above.
    pub profile: Option<PathBuf>,

    /// Exit the process instead of serving degraded when construction fails.
    pub required: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_samples: 120,
            smoothing_window: 5,
            regularity_threshold: 0.05,
            error_threshold: 0.001,
            profile: None,
            required: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8300");
        assert_eq!(config.pipeline.compression_threshold_bytes, 1000);
        assert!(config.pipeline.credentials_allowed);
        assert_eq!(config.engine.min_samples, 120);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_pipeline_section() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [pipeline]
            allowed_origins = ["https://a.example", "https://b.example"]
            credentials_allowed = false
            compression_threshold_bytes = 256

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.allowed_origins.len(), 2);
        assert!(!config.pipeline.credentials_allowed);
        assert_eq!(config.pipeline.compression_threshold_bytes, 256);
        assert!(!config.pipeline.allows_any_origin());
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
