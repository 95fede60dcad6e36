//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs, manager.rs):
//!     Config loaded → Routes registered → Engine constructed → Ready → Serve
//!
//! Shutdown (shutdown.rs, manager.rs):
//!     Signal received → Stop accepting → Drain requests
//!     → ShuttingDown → Release engine → Stopped → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - `ProcessState` is an explicit, injected context object, not a global
//! - Engine construction failure degrades the service instead of exiting
//! - Only `LifecycleManager` writes the phase or the engine slot

pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use manager::LifecycleManager;
pub use shutdown::Shutdown;
pub use startup::{StartupOutcome, UnreadyReason};
pub use state::{DetectionEngineHandle, EngineRef, Phase, ProcessState, Unavailable};
