//! The request multiplexer.
//!
//! # Responsibilities
//! - Register method + pattern handlers into per-method route tries
//! - Register prefix middleware with globally increasing ids
//! - Resolve, run the horizon-filtered middleware chain, then the handler
//!
//! # Design Decisions
//! - Registration takes `&mut self` and returns `RouteError`; serving takes
//!   `&self`, so the tries are read-only once shared behind `Arc`
//! - "Not found" is `None` from `resolve`, never an error
//! - A handler only sees middleware registered before it (its horizon)

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::http::request::{path_segments, Request};
use crate::http::response;
use crate::routing::middleware::{Flow, Handler, Middleware};
use crate::routing::tree::{Endpoint, MiddlewareNode, RouteNode};
use crate::routing::RouteError;

/// A resolved route.
pub struct RouteMatch {
    pub handler: Arc<dyn Handler>,
    /// Highest middleware id registered before the route.
    pub horizon: u64,
    /// Bound parameters in descent order.
    pub params: Vec<(String, String)>,
}

impl std::fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch")
            .field("horizon", &self.horizon)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct HttpMux {
    routes: HashMap<Method, RouteNode>,
    middleware: MiddlewareNode,
    last_middleware_id: u64,
}

impl std::fmt::Debug for HttpMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<&str> = self.routes.keys().map(Method::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("HttpMux")
            .field("methods", &methods)
            .field("last_middleware_id", &self.last_middleware_id)
            .finish_non_exhaustive()
    }
}

impl HttpMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for a `"METHOD /pattern"` route.
    ///
    /// Segments starting with `:` bind a parameter; `*` binds the remaining
    /// tail as `wildcard` and ends the pattern.
    pub fn handle_func<H: Handler>(&mut self, route: &str, handler: H) -> Result<(), RouteError> {
        let (method, pattern) = route
            .trim()
            .split_once(' ')
            .ok_or_else(|| RouteError::InvalidPattern(route.to_string()))?;
        let pattern = pattern.trim();
        if !pattern.starts_with('/') {
            return Err(RouteError::InvalidPattern(route.to_string()));
        }
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| RouteError::InvalidMethod(method.to_string()))?;

        let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let endpoint = Endpoint {
            handler: Arc::new(handler),
            horizon: self.last_middleware_id,
        };
        self.routes
            .entry(method)
            .or_default()
            .insert(route, &segments, endpoint)
    }

    /// Register `middleware` for every request whose path starts with `prefix`.
    pub fn handle<M: Middleware>(&mut self, prefix: &str, middleware: M) {
        self.last_middleware_id += 1;
        let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
        self.middleware
            .insert(&segments, self.last_middleware_id, Arc::new(middleware));
    }

    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.resolve_segments(method, &path_segments(path))
    }

    fn resolve_segments(&self, method: &Method, segments: &[String]) -> Option<RouteMatch> {
        let resolved = self.routes.get(method)?.resolve(segments)?;
        Some(RouteMatch {
            handler: resolved.endpoint.handler,
            horizon: resolved.endpoint.horizon,
            params: resolved.params,
        })
    }

    /// Run the middleware chain for `request`. `horizon` is `None` when no
    /// route matched, in which case every entry on the path runs.
    pub async fn run_middleware(&self, request: Request, horizon: Option<u64>) -> Flow {
        let chain = self.middleware.chain(request.segments(), horizon);
        let mut request = request;
        for middleware in chain {
            match middleware.call(request).await {
                Flow::Next(next) => request = next,
                respond @ Flow::Respond(_) => return respond,
            }
        }
        Flow::Next(request)
    }

    /// Full request cycle.
    pub async fn dispatch(&self, request: Request) -> Response {
        let matched = self.resolve_segments(request.method(), request.segments());
        let horizon = matched.as_ref().map(|m| m.horizon);

        let mut request = match self.run_middleware(request, horizon).await {
            Flow::Next(request) => request,
            Flow::Respond(response) => return response,
        };

        let Some(matched) = matched else {
            tracing::debug!(
                request_id = %request.request_id(),
                method = %request.method(),
                path = %request.path(),
                "No route matched"
            );
            return response::not_found();
        };

        request.set_path_params(matched.params);
        matched.handler.call(request).await
    }

    /// Turn this mux into middleware mounted under `prefix`.
    ///
    /// Requests below `prefix` have it stripped from their path and are
    /// answered by this mux, 404 included. Other requests pass through.
    pub fn nest(self, prefix: &str) -> Nest {
        Nest {
            prefix: path_segments(prefix),
            mux: Arc::new(self),
        }
    }
}

pub struct Nest {
    prefix: Vec<String>,
    mux: Arc<HttpMux>,
}

impl Middleware for Nest {
    fn call(&self, mut request: Request) -> BoxFuture<'static, Flow> {
        if !request.segments().starts_with(&self.prefix) {
            return Box::pin(async move { Flow::Next(request) });
        }
        let rest = request.segments()[self.prefix.len()..].join("/");
        request.set_path(&format!("/{}", rest));

        let mux = self.mux.clone();
        Box::pin(async move { Flow::Respond(mux.dispatch(request).await) })
    }
}
