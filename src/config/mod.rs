//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + ALLOWED_ORIGINS env
//!     → loader.rs (parse, deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared by value/Arc with the lifecycle, pipeline and engine
//! ```
//!
//! # Design Decisions
//! - Config is loaded once before the process state exists; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Wildcard origins with credentials are refused here, never at request time

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    EngineConfig, LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig, PipelineConfig,
    ServiceConfig, TimeoutConfig,
};
