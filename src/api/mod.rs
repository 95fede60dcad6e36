//! HTTP routes served by the dispatcher.
//!
//! | Method | Path               | Needs engine |
//! |--------|--------------------|--------------|
//! | GET    | `/`                | no           |
//! | GET    | `/health`          | no           |
//! | GET    | `/ready`           | no           |
//! | POST   | `/api/get_points`  | yes          |

pub mod points;
pub mod status;

use axum::http::Method;

use crate::error::Result;
use crate::routing::Dispatcher;

/// Prefix of the business routes.
pub const API_PREFIX: &str = "/api";

pub fn register_routes(dispatcher: &mut Dispatcher) -> Result<()> {
    dispatcher
        .register(Method::GET, "/", status::get_status)?
        .register(Method::GET, "/health", status::get_health)?
        .register(Method::GET, "/ready", status::get_ready)?
        .register(
            Method::POST,
            &format!("{API_PREFIX}/get_points"),
            points::get_points,
        )?;
    Ok(())
}
