//! Response compression stage.
//!
//! Bodies at or above the threshold are gzip-encoded when the client accepts
//! gzip. Handlers never compress on their own.

use std::io::Write;

use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
};
use flate2::write::GzEncoder;

use crate::pipeline::{append_vary, BufferedResponse, RequestHead, Stage};

#[derive(Debug, Clone)]
pub struct Compression {
    threshold: usize,
    level: flate2::Compression,
}

impl Compression {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            level: flate2::Compression::default(),
        }
    }

    fn should_compress(&self, request: &RequestHead, response: &BufferedResponse) -> bool {
        let body = response.body();
        !body.is_empty()
            && body.len() >= self.threshold
            && request.method != Method::HEAD
            && response.status() != StatusCode::NO_CONTENT
            && !response.headers().contains_key(header::CONTENT_ENCODING)
            && accepts_gzip(&request.headers)
    }

    fn gzip(&self, body: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), self.level);
        encoder.write_all(body)?;
        encoder.finish()
    }
}

impl Stage for Compression {
    fn name(&self) -> &'static str {
        "compression"
    }

    fn observe(&self, request: &RequestHead, response: BufferedResponse) -> BufferedResponse {
        if !self.should_compress(request, &response) {
            return response;
        }

        let (mut parts, body) = response.into_parts();
        let compressed = match self.gzip(&body) {
            Ok(compressed) => compressed,
            Err(e) => {
                tracing::warn!(error = %e, size = body.len(), "Compression failed; sending identity body");
                return BufferedResponse::from_parts(parts, body);
            }
        };

        tracing::trace!(original = body.len(), compressed = compressed.len(), "Response compressed");

        parts
            .headers
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(compressed.len()));
        append_vary(&mut parts.headers, "accept-encoding");
        BufferedResponse::from_parts(parts, Bytes::from(compressed))
    }
}

/// True if `Accept-Encoding` lists gzip (or `*`) with a non-zero quality.
fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|entry| {
            let mut params = entry.split(';');
            let coding = params.next().unwrap_or("").trim();
            if !(coding.eq_ignore_ascii_case("gzip") || coding == "*") {
                return false;
            }
            params
                .filter_map(|p| p.trim().strip_prefix("q="))
                .all(|q| q.trim().parse::<f32>().map(|q| q > 0.0).unwrap_or(false))
        })
}
