//! Trajectory Guard: an HTTP service that classifies pointer trajectories
//! with a single long-lived detection engine.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routing;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use http::HttpServer;
pub use lifecycle::{LifecycleManager, Phase, ProcessState, Shutdown};
