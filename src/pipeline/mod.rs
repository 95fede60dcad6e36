//! Request pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → stage[0].inspect → stage[1].inspect → ...   (may answer early)
//!     → route dispatch
//!     → response body buffered
//!     → stage[0].observe → stage[1].observe → ...
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - Stages are an ordered list of values, fixed when the server is built
//! - `observe` runs in the same order as `inspect`: the origin filter sees the
//!   uncompressed response, compression always runs last
//! - Responses are buffered so stages can make size-based decisions

pub mod compression;
pub mod origin;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri},
    middleware::Next,
    response::IntoResponse,
};

use crate::config::validation::{validate_pipeline, ValidationError};
use crate::config::PipelineConfig;

pub use compression::Compression;
pub use origin::OriginFilter;

/// A response whose body has been fully read.
pub type BufferedResponse = Response<Bytes>;

/// What a stage decided after looking at the inbound request.
#[derive(Debug)]
pub enum Inspection {
    /// Hand the request to the next stage.
    Continue,
    /// Answer now; dispatch is skipped.
    Respond(BufferedResponse),
}

/// The parts of the request stages may consult on the way out.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
        }
    }
}

/// A cross-cutting transformation applied to every request and response.
pub trait Stage: Send + Sync + fmt::Debug + 'static {
    fn name(&self) -> &'static str;

    fn inspect(&self, _request: &mut Request<Body>) -> Inspection {
        Inspection::Continue
    }

    fn observe(&self, _request: &RequestHead, response: BufferedResponse) -> BufferedResponse {
        response
    }
}

/// Ordered, immutable list of stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Arc<[Box<dyn Stage>]>,
    max_response_bytes: usize,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>, max_response_bytes: usize) -> Self {
        Self {
            stages: stages.into(),
            max_response_bytes,
        }
    }

    /// The standard pipeline: origin filter, then compression.
    pub fn from_config(
        config: &PipelineConfig,
        max_response_bytes: usize,
    ) -> Result<Self, Vec<ValidationError>> {
        let errors = validate_pipeline(config);
        if !errors.is_empty() {
            return Err(errors);
        }

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(OriginFilter::new(config)),
            Box::new(Compression::new(config.compression_threshold_bytes)),
        ];
        Ok(Self::new(stages, max_response_bytes))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run `request` through every stage around `next`.
    pub async fn run<F, Fut>(&self, mut request: Request<Body>, next: F) -> Response<Body>
    where
        F: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Response<Body>>,
    {
        for stage in self.stages.iter() {
            if let Inspection::Respond(response) = stage.inspect(&mut request) {
                tracing::debug!(stage = stage.name(), "Pipeline stage answered early");
                let head = RequestHead::from_request(&request);
                return self.observe_all(&head, response).map(Body::from);
            }
        }

        let head = RequestHead::from_request(&request);
        let (parts, body) = next(request).await.into_parts();
        let bytes = match axum::body::to_bytes(body, self.max_response_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, path = %head.uri.path(), "Failed to buffer response body");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        self.observe_all(&head, Response::from_parts(parts, bytes))
            .map(Body::from)
    }

    fn observe_all(&self, head: &RequestHead, response: BufferedResponse) -> BufferedResponse {
        self.stages
            .iter()
            .fold(response, |response, stage| stage.observe(head, response))
    }
}

/// Axum middleware adapter for [`Pipeline::run`].
pub async fn pipeline_middleware(
    State(pipeline): State<Pipeline>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    pipeline.run(request, |request| next.run(request)).await
}

/// Add `token` to the `Vary` header unless it is already listed.
pub(crate) fn append_vary(headers: &mut HeaderMap, token: &'static str) {
    let present = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|listed| {
            let listed = listed.trim();
            listed == "*" || listed.eq_ignore_ascii_case(token)
        });
    if !present {
        headers.append(header::VARY, HeaderValue::from_static(token));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the order in which stages run.
    #[derive(Debug)]
    struct Tagging {
        tag: &'static str,
        answer_early: bool,
    }

    impl Stage for Tagging {
        fn name(&self) -> &'static str {
            self.tag
        }

        fn inspect(&self, request: &mut Request<Body>) -> Inspection {
            request
                .headers_mut()
                .append("x-inspected", HeaderValue::from_static(self.tag));
            if self.answer_early {
                Inspection::Respond(Response::new(Bytes::from_static(b"early")))
            } else {
                Inspection::Continue
            }
        }

        fn observe(&self, _request: &RequestHead, mut response: BufferedResponse) -> BufferedResponse {
            response
                .headers_mut()
                .append("x-observed", HeaderValue::from_static(self.tag));
            response
        }
    }

    fn tagging(tag: &'static str, answer_early: bool) -> Box<dyn Stage> {
        Box::new(Tagging { tag, answer_early })
    }

    fn values(headers: &HeaderMap, name: &str) -> Vec<String> {
        headers
            .get_all(name)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_stages_run_in_order_on_both_legs() {
        let pipeline = Pipeline::new(vec![tagging("a", false), tagging("b", false)], 1024);

        let response = pipeline
            .run(Request::new(Body::empty()), |request| async move {
                let seen = values(request.headers(), "x-inspected").join(",");
                Response::new(Body::from(seen))
            })
            .await;

        assert_eq!(values(response.headers(), "x-observed"), vec!["a", "b"]);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"a,b");
    }

    #[tokio::test]
    async fn test_early_response_skips_dispatch() {
        let dispatched = AtomicUsize::new(0);
        let pipeline = Pipeline::new(vec![tagging("a", true), tagging("b", false)], 1024);

        let response = pipeline
            .run(Request::new(Body::empty()), |_request| async {
                dispatched.fetch_add(1, Ordering::SeqCst);
                Response::new(Body::empty())
            })
            .await;

        assert_eq!(dispatched.load(Ordering::SeqCst), 0);
        assert_eq!(values(response.headers(), "x-observed"), vec!["a", "b"]);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"early");
    }

    #[tokio::test]
    async fn test_oversized_response_is_server_error() {
        let pipeline = Pipeline::new(vec![], 4);
        let response = pipeline
            .run(Request::new(Body::empty()), |_request| async {
                Response::new(Body::from("too long"))
            })
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_from_config_rejects_wildcard_with_credentials() {
        let mut config = PipelineConfig::default();
        config.allowed_origins.insert("*".into());
        config.credentials_allowed = true;

        let errors = Pipeline::from_config(&config, 1024).unwrap_err();
        assert_eq!(errors, vec![ValidationError::WildcardWithCredentials]);
    }

    #[test]
    fn test_standard_stage_order() {
        let pipeline = Pipeline::from_config(&PipelineConfig::default(), 1024).unwrap();
        assert_eq!(pipeline.stage_names(), vec!["origin_filter", "compression"]);
    }

    #[test]
    fn test_append_vary_deduplicates() {
        let mut headers = HeaderMap::new();
        append_vary(&mut headers, "origin");
        append_vary(&mut headers, "Origin");
        append_vary(&mut headers, "accept-encoding");
        assert_eq!(values(&headers, "vary"), vec!["origin", "accept-encoding"]);
    }
}
