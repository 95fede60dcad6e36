//! Detection engine collaborator.
//!
//! # Data Flow
//! ```text
//! EngineFactory (constructor collaborator)
//!     → lifecycle::startup builds exactly one engine
//!     → ProcessState stores it
//!     → handlers acquire() a shared reference per request
//!     → analyze(Trajectory) → Analysis
//!     → lifecycle::shutdown calls release() once
//! ```
//!
//! The lifecycle core only depends on the [`DetectionEngine`] trait; the
//! bundled [`PatternDetector`] is the default implementation.

pub mod detector;
pub mod types;

use thiserror::Error;
use uuid::Uuid;

use crate::config::EngineConfig;

pub use detector::PatternDetector;
pub use types::{Analysis, Sample, Trajectory, Verdict};

/// Errors raised by the engine and its constructor.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine parameters: {0}")]
    InvalidConfig(String),

    #[error("cannot read profile {path}: {source}")]
    ProfileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse profile: {0}")]
    ProfileParse(#[from] toml::de::Error),

    #[error("engine construction panicked: {0}")]
    Panicked(String),

    #[error("trajectory has {got} samples, need at least {required}")]
    InsufficientSamples { got: usize, required: usize },

    #[error("engine already released")]
    Released,

    #[error("engine cleanup failed: {0}")]
    Cleanup(String),
}

/// The long-lived analysis engine shared by all requests.
///
/// Implementations must be safe for concurrent `analyze` calls.
pub trait DetectionEngine: Send + Sync + 'static {
    /// Identity of this instance, stable for its whole lifetime.
    fn instance_id(&self) -> Uuid;

    /// Minimum trajectory length `analyze` accepts.
    fn min_samples(&self) -> usize;

    fn analyze(&self, trajectory: &Trajectory) -> Result<Analysis, EngineError>;

    /// Free engine resources. Called once, after traffic has drained.
    fn release(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Constructor collaborator invoked once by the lifecycle manager.
pub trait EngineFactory: Send + 'static {
    fn build(self: Box<Self>) -> Result<Box<dyn DetectionEngine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: FnOnce() -> Result<Box<dyn DetectionEngine>, EngineError> + Send + 'static,
{
    fn build(self: Box<Self>) -> Result<Box<dyn DetectionEngine>, EngineError> {
        (*self)()
    }
}

/// Factory for the bundled [`PatternDetector`].
pub fn pattern_detector_factory(config: EngineConfig) -> Box<dyn EngineFactory> {
    Box::new(move || {
        PatternDetector::load(&config).map(|detector| Box::new(detector) as Box<dyn DetectionEngine>)
    })
}
