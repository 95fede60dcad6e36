//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     api::register_routes → Dispatcher::register (method, path, handler)
//!     → frozen behind Arc
//!
//! Per request:
//!     axum fallback → Dispatcher::dispatch
//!     → exact (path, method) lookup → handler(request, AppState)
//!     → or 404 route_not_found
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route

pub mod dispatcher;

pub use dispatcher::{Dispatcher, Handler};
