//! Process-wide lifecycle state and the shared engine slot.
//!
//! # States
//! ```text
//! Uninitialized → Ready → ShuttingDown → Stopped
//! Uninitialized ─────────→ ShuttingDown → Stopped   (engine never built)
//! ```
//!
//! # Design Decisions
//! - Phase lives in an `AtomicU8`, the engine in an `ArcSwapOption`; readers
//!   never take a lock
//! - The engine is stored before `Ready` is published and removed after
//!   `ShuttingDown` is published, so a reader that sees `Ready` finds it
//! - Only the lifecycle manager mutates this state (`pub(crate)` writers)

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use thiserror::Error;

use crate::engine::DetectionEngine;
use crate::error::ServiceError;

/// Lifecycle phase of the whole service.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized = 0,
    Ready = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl From<u8> for Phase {
    fn from(val: u8) -> Self {
        match val {
            1 => Phase::Ready,
            2 => Phase::ShuttingDown,
            3 => Phase::Stopped,
            _ => Phase::Uninitialized,
        }
    }
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Ready => "ready",
            Phase::ShuttingDown => "shutting_down",
            Phase::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The engine could not be handed out in the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("detection engine unavailable (phase: {phase})")]
pub struct Unavailable {
    pub phase: Phase,
}

impl From<Unavailable> for ServiceError {
    fn from(err: Unavailable) -> Self {
        ServiceError::EngineUnavailable { phase: err.phase }
    }
}

/// Owner of the constructed engine while it sits in the process state.
pub struct DetectionEngineHandle {
    engine: Box<dyn DetectionEngine>,
    installed_at: Instant,
}

impl DetectionEngineHandle {
    pub(crate) fn new(engine: Box<dyn DetectionEngine>) -> Self {
        Self {
            engine,
            installed_at: Instant::now(),
        }
    }

    pub fn engine(&self) -> &dyn DetectionEngine {
        self.engine.as_ref()
    }

    /// Time since the engine became available.
    pub fn age(&self) -> std::time::Duration {
        self.installed_at.elapsed()
    }
}

impl fmt::Debug for DetectionEngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionEngineHandle")
            .field("instance_id", &self.engine.instance_id())
            .finish()
    }
}

/// Request-scoped read access to the engine.
///
/// Handlers get one from [`ProcessState::acquire`] and must drop it before
/// returning.
#[derive(Debug, Clone)]
pub struct EngineRef(Arc<DetectionEngineHandle>);

impl EngineRef {
    /// True if both references point at the same engine instance.
    pub fn same_instance(&self, other: &EngineRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for EngineRef {
    type Target = dyn DetectionEngine;

    fn deref(&self) -> &Self::Target {
        self.0.engine()
    }
}

/// Lifecycle phase plus the engine slot, shared by every request.
#[derive(Debug)]
pub struct ProcessState {
    phase: AtomicU8,
    engine: ArcSwapOption<DetectionEngineHandle>,
}

impl ProcessState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Uninitialized as u8),
            engine: ArcSwapOption::empty(),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from(self.phase.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == Phase::Ready
    }

    /// Hand out the engine if the service is `Ready`.
    ///
    /// Never blocks and never waits for readiness.
    pub fn acquire(&self) -> Result<EngineRef, Unavailable> {
        let phase = self.phase();
        if phase != Phase::Ready {
            return Err(Unavailable { phase });
        }
        self.engine
            .load_full()
            .map(EngineRef)
            .ok_or_else(|| Unavailable {
                phase: self.phase(),
            })
    }

    /// Store the engine and publish `Ready`. Only valid from `Uninitialized`.
    pub(crate) fn install(&self, engine: Box<dyn DetectionEngine>) -> Result<(), Phase> {
        let current = self.phase();
        if current != Phase::Uninitialized {
            return Err(current);
        }
        self.engine.store(Some(Arc::new(DetectionEngineHandle::new(engine))));
        self.phase
            .compare_exchange(
                Phase::Uninitialized as u8,
                Phase::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|actual| {
                self.engine.store(None);
                Phase::from(actual)
            })
    }

    /// Publish `ShuttingDown`, returning the previous phase.
    ///
    /// Leaves a `Stopped` state untouched and reports it.
    pub(crate) fn begin_shutdown(&self) -> Phase {
        let previous = self
            .phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (Phase::from(current) != Phase::Stopped).then_some(Phase::ShuttingDown as u8)
            })
            .unwrap_or_else(|stopped| stopped);
        Phase::from(previous)
    }

    /// Remove the engine from the slot. Subsequent `acquire` calls fail.
    pub(crate) fn take_engine(&self) -> Option<Arc<DetectionEngineHandle>> {
        self.engine.swap(None)
    }

    pub(crate) fn mark_stopped(&self) {
        self.phase.store(Phase::Stopped as u8, Ordering::Release);
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Analysis, EngineError, Trajectory, Verdict};
    use uuid::Uuid;

    struct StubEngine(Uuid);

    impl DetectionEngine for StubEngine {
        fn instance_id(&self) -> Uuid {
            self.0
        }

        fn min_samples(&self) -> usize {
            0
        }

        fn analyze(&self, trajectory: &Trajectory) -> Result<Analysis, EngineError> {
            Ok(Analysis {
                error_mean: 0.0,
                interval_cv: 0.0,
                verdict: Verdict::Human,
                samples: trajectory.len(),
            })
        }
    }

    #[test]
    fn test_acquire_before_ready_is_unavailable() {
        let state = ProcessState::new();
        assert_eq!(state.phase(), Phase::Uninitialized);
        assert_eq!(
            state.acquire().unwrap_err(),
            Unavailable {
                phase: Phase::Uninitialized
            }
        );
    }

    #[test]
    fn test_install_then_acquire_same_instance() {
        let state = ProcessState::new();
        let id = Uuid::new_v4();
        state.install(Box::new(StubEngine(id))).unwrap();

        let a = state.acquire().unwrap();
        let b = state.acquire().unwrap();
        assert!(a.same_instance(&b));
        assert_eq!(a.instance_id(), id);
        assert!(state.is_ready());
    }

    #[test]
    fn test_install_twice_rejected() {
        let state = ProcessState::new();
        state.install(Box::new(StubEngine(Uuid::new_v4()))).unwrap();
        let err = state.install(Box::new(StubEngine(Uuid::new_v4()))).unwrap_err();
        assert_eq!(err, Phase::Ready);
    }

    #[test]
    fn test_shutdown_transitions() {
        let state = ProcessState::new();
        state.install(Box::new(StubEngine(Uuid::new_v4()))).unwrap();

        assert_eq!(state.begin_shutdown(), Phase::Ready);
        assert_eq!(state.acquire().unwrap_err().phase, Phase::ShuttingDown);
        assert!(state.take_engine().is_some());
        assert!(state.take_engine().is_none());

        state.mark_stopped();
        assert_eq!(state.begin_shutdown(), Phase::Stopped);
        assert_eq!(state.phase(), Phase::Stopped);
        assert_eq!(state.acquire().unwrap_err().phase, Phase::Stopped);
    }

    #[test]
    fn test_phase_roundtrip_through_u8() {
        for phase in [
            Phase::Uninitialized,
            Phase::Ready,
            Phase::ShuttingDown,
            Phase::Stopped,
        ] {
            assert_eq!(Phase::from(phase as u8), phase);
        }
    }
}
