//! Route and middleware tries.
//!
//! One `RouteNode` trie per HTTP method; one `MiddlewareNode` trie for the
//! whole mux. Both are keyed by path segment and frozen once serving starts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::http::request::WILDCARD_PARAM;
use crate::routing::middleware::{Handler, Middleware};
use crate::routing::RouteError;

/// Handler attached to a terminal node plus the middleware id in effect when
/// it was registered.
#[derive(Clone)]
pub(crate) struct Endpoint {
    pub handler: Arc<dyn Handler>,
    pub horizon: u64,
}

#[derive(Default)]
pub(crate) struct RouteNode {
    children: HashMap<String, RouteNode>,
    param: Option<(String, Box<RouteNode>)>,
    wildcard: Option<Box<RouteNode>>,
    endpoint: Option<Endpoint>,
}

/// Result of a successful lookup.
pub(crate) struct Resolved {
    pub endpoint: Endpoint,
    pub params: Vec<(String, String)>,
}

impl RouteNode {
    /// Walk or create the nodes for `segments` and attach `endpoint` at the end.
    pub fn insert(&mut self, pattern: &str, segments: &[&str], endpoint: Endpoint) -> Result<(), RouteError> {
        let mut node = self;
        for segment in segments {
            if *segment == "*" {
                node = node.wildcard.get_or_insert_with(Default::default).as_mut();
                break;
            } else if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(RouteError::InvalidPattern(pattern.to_string()));
                }
                let (existing, child) = node
                    .param
                    .get_or_insert_with(|| (name.to_string(), Box::default()));
                if existing.as_str() != name {
                    return Err(RouteError::ParamConflict {
                        pattern: pattern.to_string(),
                        existing: existing.clone(),
                        requested: name.to_string(),
                    });
                }
                node = child.as_mut();
            } else {
                node = node.children.entry(segment.to_string()).or_default();
            }
        }

        if node.endpoint.is_some() {
            return Err(RouteError::Duplicate(pattern.to_string()));
        }
        node.endpoint = Some(endpoint);
        Ok(())
    }

    /// Literal, then parametric, then wildcard at each depth; no backtracking.
    pub fn resolve(&self, segments: &[String]) -> Option<Resolved> {
        let mut node = self;
        let mut params = Vec::new();

        for (depth, segment) in segments.iter().enumerate() {
            if let Some(child) = node.children.get(segment) {
                node = child;
            } else if let Some((name, child)) = &node.param {
                params.push((name.clone(), segment.clone()));
                node = &**child;
            } else if let Some(child) = &node.wildcard {
                params.push((WILDCARD_PARAM.to_string(), segments[depth..].join("/")));
                node = &**child;
                break;
            } else {
                return None;
            }
        }

        node.endpoint.clone().map(|endpoint| Resolved { endpoint, params })
    }
}

struct MiddlewareEntry {
    id: u64,
    middleware: Arc<dyn Middleware>,
}

#[derive(Default)]
pub(crate) struct MiddlewareNode {
    children: HashMap<String, MiddlewareNode>,
    stack: Vec<MiddlewareEntry>,
}

impl MiddlewareNode {
    /// Append an entry under `segments`. Ids arrive in increasing order, so
    /// each local stack stays sorted.
    pub fn insert(&mut self, segments: &[&str], id: u64, middleware: Arc<dyn Middleware>) {
        let mut node = self;
        for segment in segments {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.stack.push(MiddlewareEntry { id, middleware });
    }

    /// Entries that apply to a request at `segments`, root first, filtered
    /// by `horizon` when the route resolved.
    pub fn chain(&self, segments: &[String], horizon: Option<u64>) -> Vec<Arc<dyn Middleware>> {
        let admitted = |entry: &&MiddlewareEntry| horizon.map_or(true, |h| entry.id <= h);
        let mut out: Vec<Arc<dyn Middleware>> = self
            .stack
            .iter()
            .filter(admitted)
            .map(|e| e.middleware.clone())
            .collect();

        let mut node = self;
        for segment in segments {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => break,
            }
            out.extend(node.stack.iter().filter(admitted).map(|e| e.middleware.clone()));
        }
        out
    }
}
