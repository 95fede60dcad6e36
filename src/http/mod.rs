//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span, timeout, body limit)
//!     → pipeline (origin filter, compression)
//!     → routing::Dispatcher (exact path + method)
//!     → api handlers (AppState: process state, limits)
//!     → Send to client
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
