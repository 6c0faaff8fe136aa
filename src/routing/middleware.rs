//! Handler and middleware abstractions.
//!
//! # Responsibilities
//! - `Handler`: terminal request → response function attached to a route
//! - `Middleware`: prefix-scoped function that either passes the request on
//!   (possibly modified) or answers it
//! - `context`: middleware that computes a typed value per request
//!
//! # Design Decisions
//! - Both traits return boxed `'static` futures so trie entries can be
//!   stored as `Arc<dyn _>` and shared across connections
//! - Blanket impls let plain async closures be registered directly

use std::future::Future;

use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;

use crate::http::request::Request;

/// Outcome of one middleware step.
#[derive(Debug)]
pub enum Flow {
    /// Continue with the next entry, then the route handler.
    Next(Request),
    /// Short-circuit the chain with this response.
    Respond(Response),
}

impl Flow {
    /// Short-circuit with any axum response value. Bare bodies get status 200.
    pub fn respond(response: impl IntoResponse) -> Self {
        Flow::Respond(response.into_response())
    }
}

pub trait Middleware: Send + Sync + 'static {
    fn call(&self, request: Request) -> BoxFuture<'static, Flow>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Flow> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, Flow> {
        Box::pin((self)(request))
    }
}

pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request) -> BoxFuture<'static, Response>;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        let fut = (self)(request);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Middleware that derives a per-request value.
///
/// `Ok(value)` is stored in the request extensions, where later middleware,
/// handlers and remote functions read it back by type. `Err(response)`
/// answers the request immediately.
pub fn context<T, F>(f: F) -> impl Middleware
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&Request) -> Result<T, Response> + Send + Sync + 'static,
{
    move |mut request: Request| {
        let outcome = f(&request);
        async move {
            match outcome {
                Ok(value) => {
                    request.extensions_mut().insert(value);
                    Flow::Next(request)
                }
                Err(response) => Flow::Respond(response),
            }
        }
    }
}
