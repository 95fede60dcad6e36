//! The lifecycle manager: sole constructor and destroyer of the engine.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::engine::EngineFactory;
use crate::error::ServiceError;
use crate::lifecycle::shutdown::release_engine;
use crate::lifecycle::startup::{construct_engine, StartupOutcome, UnreadyReason};
use crate::lifecycle::state::{Phase, ProcessState};
use crate::observability::metrics;

/// Drives `ProcessState` through `startup()` and `shutdown()`.
pub struct LifecycleManager {
    state: Arc<ProcessState>,
    factory: Mutex<Option<Box<dyn EngineFactory>>>,
}

impl LifecycleManager {
    pub fn new(factory: Box<dyn EngineFactory>) -> Self {
        Self {
            state: Arc::new(ProcessState::new()),
            factory: Mutex::new(Some(factory)),
        }
    }

    /// Shared state handed to request handlers.
    pub fn state(&self) -> Arc<ProcessState> {
        Arc::clone(&self.state)
    }

    /// Construct the engine and publish `Ready`.
    ///
    /// A construction failure is logged and reported in the outcome; the
    /// state stays `Uninitialized`. Calling this a second time is a no-op.
    pub async fn startup(&self) -> StartupOutcome {
        let factory = self
            .factory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(factory) = factory else {
            tracing::warn!(phase = %self.state.phase(), "Startup already invoked");
            return StartupOutcome::Unready(UnreadyReason::AlreadyStarted);
        };

        tracing::info!("Constructing detection engine");
        let started = Instant::now();

        let engine = match construct_engine(factory).await {
            Ok(engine) => engine,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Detection engine construction failed; engine-dependent routes will return 503"
                );
                metrics::set_engine_ready(false);
                return StartupOutcome::Unready(UnreadyReason::ConstructionFailed(e));
            }
        };

        let id = engine.instance_id();
        if let Err(phase) = self.state.install(engine) {
            // Only reachable if shutdown ran before startup finished.
            tracing::warn!(engine = %id, phase = %phase, "Engine built after shutdown began; discarding");
            return StartupOutcome::Unready(UnreadyReason::AlreadyStarted);
        }

        metrics::set_engine_ready(true);
        tracing::info!(
            engine = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Detection engine ready"
        );
        StartupOutcome::Ready { engine: id }
    }

    /// Release the engine and move to `Stopped`.
    ///
    /// Safe after a failed startup and when called more than once.
    pub fn shutdown(&self) -> Result<(), ServiceError> {
        let previous = self.state.begin_shutdown();
        if previous == Phase::Stopped {
            tracing::debug!("Shutdown already complete");
            return Ok(());
        }

        tracing::info!(phase = %previous, "Shutting down");
        metrics::set_engine_ready(false);

        let released = match self.state.take_engine() {
            Some(handle) => release_engine(handle),
            None => {
                tracing::debug!("No detection engine to release");
                Ok(())
            }
        };

        self.state.mark_stopped();

        match released {
            Ok(()) => {
                tracing::info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Detection engine cleanup failed");
                Err(ServiceError::ShutdownCleanupFailed(e))
            }
        }
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("phase", &self.state.phase())
            .finish()
    }
}
