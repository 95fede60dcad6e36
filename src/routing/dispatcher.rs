//! Route registration and dispatch.
//!
//! # Responsibilities
//! - Store handlers keyed by exact path and method
//! - Look up the handler for a request, or answer 404
//! - Record per-route request metrics
//!
//! # Design Decisions
//! - Routes are registered before traffic and frozen behind an `Arc`
//! - Exact matching only: no prefixes, no parameters
//! - Unknown path and unknown method both yield `route_not_found`

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::{Method, Request},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;

use crate::error::ServiceError;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Label used for requests that matched no route.
const UNMATCHED_ROUTE: &str = "unmatched";

/// An async request handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request<Body>, state: AppState) -> BoxFuture<'static, Response>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request<Body>, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, request: Request<Body>, state: AppState) -> BoxFuture<'static, Response> {
        Box::pin(self(request, state))
    }
}

/// Exact path + method router.
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<String, HashMap<Method, Arc<dyn Handler>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method path`. Each pair may be registered once.
    pub fn register<H: Handler>(
        &mut self,
        method: Method,
        path: &str,
        handler: H,
    ) -> Result<&mut Self, ServiceError> {
        let by_method = self.routes.entry(path.to_string()).or_default();
        if by_method.contains_key(&method) {
            return Err(ServiceError::DuplicateRoute {
                method,
                path: path.to_string(),
            });
        }
        tracing::debug!(method = %method, path = %path, "Route registered");
        by_method.insert(method, Arc::new(handler));
        Ok(self)
    }

    /// Number of registered (path, method) pairs.
    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<Arc<dyn Handler>> {
        self.routes.get(path)?.get(method).cloned()
    }

    /// Run the handler registered for the request, or return 404.
    pub async fn dispatch(&self, request: Request<Body>, state: AppState) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let (route, response) = match self.lookup(&method, &path) {
            Some(handler) => (path.as_str(), handler.call(request, state).await),
            None => {
                tracing::debug!(method = %method, path = %path, "No route matched");
                let err = ServiceError::RouteNotFound {
                    method: method.clone(),
                    path: path.clone(),
                };
                (UNMATCHED_ROUTE, err.into_response())
            }
        };

        metrics::record_request(method.as_str(), route, response.status().as_u16(), start);
        response
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<String> = self
            .routes
            .iter()
            .flat_map(|(path, methods)| methods.keys().map(move |m| format!("{m} {path}")))
            .collect();
        routes.sort();
        f.debug_struct("Dispatcher").field("routes", &routes).finish()
    }
}
