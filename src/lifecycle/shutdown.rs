//! Shutdown coordination.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::engine::EngineError;
use crate::lifecycle::state::DetectionEngineHandle;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that servers and tests can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// A future that resolves once [`Shutdown::trigger`] is called.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the engine's cleanup. The handle is dropped once the last
/// request-scoped reference goes away.
pub(crate) fn release_engine(handle: Arc<DetectionEngineHandle>) -> Result<(), EngineError> {
    let engine = handle.engine();
    tracing::debug!(
        engine = %engine.instance_id(),
        age_secs = handle.age().as_secs(),
        outstanding_refs = Arc::strong_count(&handle) - 1,
        "Releasing detection engine"
    );
    engine.release()
}
