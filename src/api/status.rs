//! Liveness, readiness and status routes. None of them need the engine.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::AppState;
use crate::lifecycle::Phase;

#[derive(Serialize)]
pub struct SystemStatus {
    pub name: &'static str,
    pub version: &'static str,
    pub phase: Phase,
    pub engine_ready: bool,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
struct Readiness {
    ready: bool,
    phase: Phase,
}

pub async fn get_status(_request: Request<Body>, state: AppState) -> Response {
    let phase = state.process.phase();
    Json(SystemStatus {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        phase,
        engine_ready: phase == Phase::Ready,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
    .into_response()
}

pub async fn get_health(_request: Request<Body>, _state: AppState) -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

pub async fn get_ready(_request: Request<Body>, state: AppState) -> Response {
    let phase = state.process.phase();
    let ready = phase == Phase::Ready;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(Readiness { ready, phase })).into_response()
}
