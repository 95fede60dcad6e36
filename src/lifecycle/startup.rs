//! Startup orchestration.
//!
//! # Responsibilities
//! - Run the engine constructor once, off the async workers
//! - Convert construction errors and panics into a tagged outcome
//!
//! # Design Decisions
//! - Degrade, don't die: a failed construction leaves the service serving
//!   routes that do not need the engine
//! - No timeout: a hung constructor keeps the service out of `Ready`

use std::any::Any;

use uuid::Uuid;

use crate::engine::{DetectionEngine, EngineError, EngineFactory};

/// Why the service did not reach `Ready`.
#[derive(Debug)]
pub enum UnreadyReason {
    /// The constructor returned an error or panicked.
    ConstructionFailed(EngineError),
    /// `startup()` had already run.
    AlreadyStarted,
}

impl std::fmt::Display for UnreadyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnreadyReason::ConstructionFailed(e) => write!(f, "{}", e),
            UnreadyReason::AlreadyStarted => write!(f, "startup already invoked"),
        }
    }
}

/// Result of the startup phase.
#[derive(Debug)]
pub enum StartupOutcome {
    Ready { engine: Uuid },
    Unready(UnreadyReason),
}

impl StartupOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, StartupOutcome::Ready { .. })
    }
}

/// Run the factory on the blocking pool, catching panics.
pub(crate) async fn construct_engine(
    factory: Box<dyn EngineFactory>,
) -> Result<Box<dyn DetectionEngine>, EngineError> {
    match tokio::task::spawn_blocking(move || factory.build()).await {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => {
            Err(EngineError::Panicked(panic_message(join_error.into_panic())))
        }
        Err(join_error) => Err(EngineError::Panicked(join_error.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
