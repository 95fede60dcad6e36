//! Configuration validation.
//!
//! Serde handles syntax; this module performs the semantic checks and
//! returns every problem found, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{EngineConfig, PipelineConfig, ServiceConfig, WILDCARD_ORIGIN};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("limits.max_body_bytes must be greater than zero")]
    ZeroBodyLimit,

    #[error("pipeline: wildcard origin cannot be combined with credentials_allowed = true")]
    WildcardWithCredentials,

    #[error("pipeline.allowed_origins entry '{0}' is not a valid origin")]
    InvalidOrigin(String),

    #[error("engine.min_samples must be at least 2")]
    TooFewSamples,

    #[error("engine.smoothing_window must be an odd number >= 3 (got {0})")]
    InvalidSmoothingWindow(usize),

    #[error("engine.{0} must be a finite, non-negative number")]
    InvalidThreshold(&'static str),
}

/// Validate a full service configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    errors.extend(validate_pipeline(&config.pipeline));
    errors.extend(validate_engine(&config.engine));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Pipeline checks, also run on configs built in code.
pub fn validate_pipeline(pipeline: &PipelineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if pipeline.allows_any_origin() && pipeline.credentials_allowed {
        errors.push(ValidationError::WildcardWithCredentials);
    }

    for origin in &pipeline.allowed_origins {
        if origin != WILDCARD_ORIGIN && !is_valid_origin(origin) {
            errors.push(ValidationError::InvalidOrigin(origin.clone()));
        }
    }

    errors
}

/// Engine parameter checks, shared with profile loading.
pub fn validate_engine(engine: &EngineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if engine.min_samples < 2 {
        errors.push(ValidationError::TooFewSamples);
    }

    if engine.smoothing_window < 3 || engine.smoothing_window % 2 == 0 {
        errors.push(ValidationError::InvalidSmoothingWindow(engine.smoothing_window));
    }

    if !is_valid_threshold(engine.regularity_threshold) {
        errors.push(ValidationError::InvalidThreshold("regularity_threshold"));
    }

    if !is_valid_threshold(engine.error_threshold) {
        errors.push(ValidationError::InvalidThreshold("error_threshold"));
    }

    errors
}

fn is_valid_threshold(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// An origin is `scheme://host[:port]` with no path, query or trailing slash.
fn is_valid_origin(origin: &str) -> bool {
    let Some((scheme, rest)) = origin.split_once("://") else {
        return false;
    };
    !scheme.is_empty()
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        && !rest.is_empty()
        && !rest.contains(['/', '?', '#', ' '])
}
