//! Remote function registry.
//!
//! Functions are registered by name on a builder and frozen into a
//! `FunctionRegistry` before serving starts. Duplicate names are rejected
//! at build time.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::codec::Value;
use crate::remote::context::{CallContext, RemoteError};

pub type RemoteResult = Result<Value, RemoteError>;

/// A function callable by name over the RPC transport.
pub trait RemoteFunction: Send + Sync + 'static {
    fn call(&self, ctx: CallContext, args: Vec<Value>) -> BoxFuture<'static, RemoteResult>;
}

impl<F, Fut> RemoteFunction for F
where
    F: Fn(CallContext, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RemoteResult> + Send + 'static,
{
    fn call(&self, ctx: CallContext, args: Vec<Value>) -> BoxFuture<'static, RemoteResult> {
        Box::pin((self)(ctx, args))
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("remote function \"{0}\" is already registered")]
    Duplicate(String),

    #[error("remote function name must not be empty")]
    EmptyName,
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn RemoteFunction>>,
}

impl FunctionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RemoteFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    functions: HashMap<String, Arc<dyn RemoteFunction>>,
}

impl RegistryBuilder {
    pub fn register<F: RemoteFunction>(mut self, name: &str, function: F) -> Result<Self, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.functions.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.functions.insert(name.to_string(), Arc::new(function));
        Ok(self)
    }

    pub fn build(self) -> FunctionRegistry {
        FunctionRegistry {
            functions: self.functions,
        }
    }
}
