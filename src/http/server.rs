//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Register routes before any traffic
//! - Run the lifecycle startup before requests are routed
//! - Wire up middleware (request ID, tracing, pipeline, timeout, body limit)
//! - Render tower-http rejections as structured errors inside the pipeline
//! - Serve until the shutdown future resolves, drain, then run lifecycle shutdown

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{Request, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api;
use crate::config::{ConfigError, LimitsConfig, ServiceConfig};
use crate::engine::{pattern_detector_factory, EngineFactory};
use crate::error::{ErrorKind, Result, ServiceError};
use crate::lifecycle::{LifecycleManager, ProcessState, StartupOutcome, UnreadyReason};
use crate::pipeline::{pipeline_middleware, Pipeline};
use crate::routing::Dispatcher;

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub process: Arc<ProcessState>,
    pub limits: LimitsConfig,
    pub started_at: Instant,
}

#[cfg(test)]
impl AppState {
    pub(crate) fn for_tests() -> Self {
        Self {
            process: Arc::new(ProcessState::new()),
            limits: LimitsConfig::default(),
            started_at: Instant::now(),
        }
    }
}

/// State for the single fallback handler that feeds the dispatcher.
#[derive(Clone)]
struct DispatchState {
    dispatcher: Arc<Dispatcher>,
    app: AppState,
}

/// The HTTP service and its lifecycle.
pub struct HttpServer {
    config: ServiceConfig,
    lifecycle: LifecycleManager,
}

impl HttpServer {
    /// Create a server whose engine is built by `factory`.
    pub fn new(config: ServiceConfig, factory: Box<dyn EngineFactory>) -> Self {
        Self {
            config,
            lifecycle: LifecycleManager::new(factory),
        }
    }

    /// Create a server with the bundled pattern detector.
    pub fn with_default_engine(config: ServiceConfig) -> Self {
        let factory = pattern_detector_factory(config.engine.clone());
        Self::new(config, factory)
    }

    /// Process state shared with handlers; useful for observing the phase.
    pub fn process_state(&self) -> Arc<ProcessState> {
        self.lifecycle.state()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &ServiceConfig, state: AppState) -> Result<Router> {
        let mut dispatcher = Dispatcher::new();
        api::register_routes(&mut dispatcher)?;
        tracing::debug!(routes = ?dispatcher, "Routes registered");

        let pipeline = Pipeline::from_config(&config.pipeline, config.limits.max_response_bytes)
            .map_err(|errors| ServiceError::Config(ConfigError::Validation(errors)))?;

        let dispatch_state = DispatchState {
            dispatcher: Arc::new(dispatcher),
            app: state,
        };

        let layer_limits = LayerLimits {
            max_body_bytes: config.limits.max_body_bytes,
            request_secs: config.timeouts.request_secs,
        };

        // Limit and timeout rejections pass through the pipeline like any
        // handler response.
        Ok(Router::new()
            .fallback(dispatch_handler)
            .with_state(dispatch_state)
            .layer(DefaultBodyLimit::max(config.limits.max_body_bytes))
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(from_fn_with_state(layer_limits, structure_layer_errors))
            .layer(from_fn_with_state(pipeline, pipeline_middleware))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown"),
                    )
                }),
            )
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid)))
    }

    /// Run the service on `listener` until `shutdown` resolves.
    ///
    /// Startup completes before the first request is routed; lifecycle
    /// shutdown runs after in-flight requests have drained. If `shutdown`
    /// resolves while the engine is still being built, the service stops
    /// without serving and the abandoned engine is never installed.
    pub async fn run<S>(self, listener: TcpListener, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let app_state = AppState {
            process: self.lifecycle.state(),
            limits: self.config.limits.clone(),
            started_at: Instant::now(),
        };
        let router = Self::build_router(&self.config, app_state)?;

        let mut shutdown = Box::pin(shutdown);
        let outcome = tokio::select! {
            outcome = self.lifecycle.startup() => outcome,
            () = &mut shutdown => {
                tracing::warn!("Shutdown requested before the engine was built; not serving");
                return self.lifecycle.shutdown();
            }
        };

        match outcome {
            StartupOutcome::Ready { .. } => {}
            StartupOutcome::Unready(UnreadyReason::ConstructionFailed(e)) if self.config.engine.required => {
                tracing::error!("Engine is required; refusing to serve");
                self.lifecycle.shutdown()?;
                return Err(ServiceError::EngineConstructionFailed(e));
            }
            StartupOutcome::Unready(reason) => {
                tracing::warn!(reason = %reason, "Serving without detection engine");
            }
        }

        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, phase = %self.lifecycle.state().phase(), "HTTP server accepting connections");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Stopped accepting connections; draining in-flight requests");
            })
            .await;

        if let Err(e) = &served {
            tracing::error!(error = %e, "HTTP server terminated with error");
        }
        tracing::info!("HTTP server stopped");

        let released = self.lifecycle.shutdown();
        served?;
        released
    }
}

/// Limits enforced by tower-http layers, kept for their error messages.
#[derive(Debug, Clone, Copy)]
struct LayerLimits {
    max_body_bytes: usize,
    request_secs: u64,
}

/// Replace the plain-text 413 and 408 produced by tower-http with
/// structured [`ServiceError`] responses.
async fn structure_layer_errors(
    State(limits): State<LayerLimits>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if response.extensions().get::<ErrorKind>().is_some() {
        return response;
    }

    let err = match response.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ServiceError::PayloadTooLarge {
            limit: limits.max_body_bytes,
        },
        StatusCode::REQUEST_TIMEOUT => ServiceError::Timeout {
            secs: limits.request_secs,
        },
        _ => return response,
    };
    tracing::debug!(kind = err.kind(), "Request rejected by transport limit");
    err.into_response()
}

async fn dispatch_handler(State(state): State<DispatchState>, request: Request<Body>) -> Response {
    state.dispatcher.dispatch(request, state.app.clone()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, Method, StatusCode};
    use tower::ServiceExt;

    fn router() -> Router {
        HttpServer::build_router(&ServiceConfig::default(), AppState::for_tests()).unwrap()
    }

    #[tokio::test]
    async fn test_business_route_unavailable_before_startup() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/get_points")
            .body(Body::from("[]"))
            .unwrap();
        let response = router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_health_served_without_engine() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_layer_timeout_becomes_structured_error() {
        let limits = LayerLimits {
            max_body_bytes: 64,
            request_secs: 7,
        };
        let app = Router::new()
            .route(
                "/slow",
                axum::routing::get(|| async { StatusCode::REQUEST_TIMEOUT }),
            )
            .layer(from_fn_with_state(limits, structure_layer_errors));

        let request = Request::builder().uri("/slow").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(
            response.extensions().get::<ErrorKind>(),
            Some(&ErrorKind("request_timeout"))
        );
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["message"], "request not completed within 7s");
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit_is_payload_too_large() {
        let mut config = ServiceConfig::default();
        config.limits.max_body_bytes = 64;
        let state = AppState {
            limits: config.limits.clone(),
            ..AppState::for_tests()
        };
        let engine = crate::engine::PatternDetector::load(&config.engine).unwrap();
        state.process.install(Box::new(engine)).unwrap();

        let chunks: Vec<std::result::Result<&'static str, std::io::Error>> =
            (0..8).map(|_| Ok("[{\"timestamp\":")).collect();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/get_points")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();
        let response = HttpServer::build_router(&config, state)
            .unwrap()
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["kind"], "payload_too_large");
    }

    #[test]
    fn test_invalid_pipeline_rejected() {
        let mut config = ServiceConfig::default();
        config.pipeline.allowed_origins.insert("*".into());
        let err = HttpServer::build_router(&config, AppState::for_tests()).unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
