//! Trajectory analysis route: `POST /api/get_points`.

use axum::{
    body::{Body, Bytes},
    extract::FromRequest,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{EngineError, Sample, Trajectory, Verdict};
use crate::error::{Result, ServiceError};
use crate::http::AppState;
use crate::observability::metrics;

/// Accepted request bodies: a bare sample array or `{ "points": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointsPayload {
    Bare(Vec<Sample>),
    Wrapped { points: Vec<Sample> },
}

impl PointsPayload {
    fn into_trajectory(self) -> Trajectory {
        match self {
            PointsPayload::Bare(samples) | PointsPayload::Wrapped { points: samples } => {
                Trajectory::new(samples)
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PointsResponse {
    pub error_mean: f64,
    pub interval_cv: f64,
    pub verdict: Verdict,
    pub samples: usize,
    /// Instance id of the engine that produced the analysis.
    pub engine: Uuid,
}

pub async fn get_points(request: Request<Body>, state: AppState) -> Response {
    match analyze(request, &state).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::warn!(kind = e.kind(), error = %e, "Trajectory analysis rejected");
            e.into_response()
        }
    }
}

async fn analyze(request: Request<Body>, state: &AppState) -> Result<PointsResponse> {
    let engine = state.process.acquire().map_err(|unavailable| {
        metrics::record_engine_unavailable();
        ServiceError::from(unavailable)
    })?;

    let body = Bytes::from_request(request, &()).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServiceError::PayloadTooLarge {
                limit: state.limits.max_body_bytes,
            }
        } else {
            ServiceError::InvalidRequest(format!("cannot read body: {}", rejection.body_text()))
        }
    })?;
    let payload: PointsPayload = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::InvalidRequest(format!("expected an array of samples: {e}")))?;
    let trajectory = payload.into_trajectory();

    let required = engine.min_samples();
    if trajectory.len() < required {
        return Err(ServiceError::InsufficientSamples {
            got: trajectory.len(),
            required,
        });
    }

    let analysis = engine.analyze(&trajectory).map_err(|e| match e {
        EngineError::InsufficientSamples { got, required } => {
            ServiceError::InsufficientSamples { got, required }
        }
        other => ServiceError::Analysis(other),
    })?;

    tracing::debug!(
        engine = %engine.instance_id(),
        samples = analysis.samples,
        verdict = ?analysis.verdict,
        error_mean = analysis.error_mean,
        "Trajectory analysed"
    );

    Ok(PointsResponse {
        error_mean: analysis.error_mean,
        interval_cv: analysis.interval_cv,
        verdict: analysis.verdict,
        samples: analysis.samples,
        engine: engine.instance_id(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Analysis, DetectionEngine};

    /// Engine that must never be asked to analyse.
    struct GuardedEngine(Uuid);

    impl DetectionEngine for GuardedEngine {
        fn instance_id(&self) -> Uuid {
            self.0
        }

        fn min_samples(&self) -> usize {
            3
        }

        fn analyze(&self, _trajectory: &Trajectory) -> std::result::Result<Analysis, EngineError> {
            panic!("short trajectories are rejected before analysis");
        }
    }

    #[tokio::test]
    async fn test_short_trajectory_rejected_before_analysis() {
        let state = AppState::for_tests();
        state
            .process
            .install(Box::new(GuardedEngine(Uuid::new_v4())))
            .unwrap();

        let body = r#"[{"timestamp":"2026-01-01T00:00:00Z","x":1,"y":2}]"#;
        let request = Request::builder()
            .method("POST")
            .uri("/api/get_points")
            .body(Body::from(body))
            .unwrap();

        let err = analyze(request, &state).await.err().unwrap();
        assert!(matches!(
            err,
            ServiceError::InsufficientSamples {
                got: 1,
                required: 3
            }
        ));
    }

    #[test]
    fn test_payload_shapes() {
        let sample = r#"{"timestamp":"2026-01-01T00:00:00Z","x":1,"y":2}"#;

        let bare: PointsPayload = serde_json::from_str(&format!("[{sample}]")).unwrap();
        assert_eq!(bare.into_trajectory().len(), 1);

        let wrapped: PointsPayload =
            serde_json::from_str(&format!(r#"{{"points":[{sample},{sample}]}}"#)).unwrap();
        assert_eq!(wrapped.into_trajectory().len(), 2);

        assert!(serde_json::from_str::<PointsPayload>(r#"{"x":1}"#).is_err());
    }
}
