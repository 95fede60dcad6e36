//! Cross-origin filter stage.
//!
//! Requests are never rejected here. A disallowed origin simply gets a
//! response without any `Access-Control-Allow-*` headers and the browser
//! enforces the rest.

use std::collections::BTreeSet;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode},
};

use crate::config::schema::WILDCARD_ORIGIN;
use crate::config::PipelineConfig;
use crate::pipeline::{append_vary, BufferedResponse, Inspection, RequestHead, Stage};

#[derive(Debug, Clone)]
pub struct OriginFilter {
    allowed: BTreeSet<String>,
    any_origin: bool,
    credentials: bool,
    max_age: HeaderValue,
}

impl OriginFilter {
    /// Build from an already validated pipeline config.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            allowed: config
                .allowed_origins
                .iter()
                .filter(|origin| origin.as_str() != WILDCARD_ORIGIN)
                .cloned()
                .collect(),
            any_origin: config.allows_any_origin(),
            credentials: config.credentials_allowed,
            max_age: HeaderValue::from(config.preflight_max_age_secs),
        }
    }

    pub fn permits(&self, origin: &str) -> bool {
        self.any_origin || self.allowed.contains(origin)
    }

    fn is_preflight(request: &Request<Body>) -> bool {
        request.method() == Method::OPTIONS
            && request.headers().contains_key(header::ORIGIN)
            && request
                .headers()
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    /// Set or strip the allow headers for `origin` on `headers`.
    fn decorate(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        let Some(origin) = origin else {
            return;
        };

        let permitted = origin.to_str().map(|o| self.permits(o)).unwrap_or(false);
        if !permitted {
            headers.remove(header::ACCESS_CONTROL_ALLOW_ORIGIN);
            headers.remove(header::ACCESS_CONTROL_ALLOW_CREDENTIALS);
            if !self.any_origin {
                append_vary(headers, "origin");
            }
            return;
        }

        // A literal "*" is only sent when credentials are off; otherwise the
        // requesting origin is echoed.
        if self.any_origin && !self.credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static(WILDCARD_ORIGIN),
            );
        } else {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            append_vary(headers, "origin");
        }

        if self.credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    fn preflight(&self, request: &Request<Body>) -> BufferedResponse {
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = StatusCode::NO_CONTENT;

        let origin = request.headers().get(header::ORIGIN);
        let permitted = origin
            .and_then(|o| o.to_str().ok())
            .is_some_and(|o| self.permits(o));

        let headers = response.headers_mut();
        self.decorate(origin, headers);
        if permitted {
            if let Some(method) = request.headers().get(header::ACCESS_CONTROL_REQUEST_METHOD) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, method.clone());
            }
            if let Some(requested) = request.headers().get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
            }
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        }
        append_vary(headers, "access-control-request-method");
        append_vary(headers, "access-control-request-headers");
        response
    }
}

impl Stage for OriginFilter {
    fn name(&self) -> &'static str {
        "origin_filter"
    }

    fn inspect(&self, request: &mut Request<Body>) -> Inspection {
        if Self::is_preflight(request) {
            tracing::debug!(
                origin = ?request.headers().get(header::ORIGIN),
                "Answering CORS preflight"
            );
            return Inspection::Respond(self.preflight(request));
        }
        Inspection::Continue
    }

    fn observe(&self, request: &RequestHead, mut response: BufferedResponse) -> BufferedResponse {
        self.decorate(request.headers.get(header::ORIGIN), response.headers_mut());
        response
    }
}
