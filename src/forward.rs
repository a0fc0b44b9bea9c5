use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::FacadeError;

/// A service whose methods can be called by name.
pub trait Forward: Send + Sync {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, FacadeError>;

    fn methods(&self) -> Vec<&str>;
}

type Method = Arc<dyn Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync>;

/// Name-to-closure dispatch table.
///
/// Method bodies return their own errors; `call` hands them back as
/// [`FacadeError::Service`] without touching them.
#[derive(Clone)]
pub struct MethodTable {
    name: String,
    methods: BTreeMap<String, Method>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::named("anonymous")
    }

    /// A table whose `MethodNotFound` errors report `name`.
    pub fn named(name: impl Into<String>) -> Self {
        MethodTable {
            name: name.into(),
            methods: BTreeMap::new(),
        }
    }

    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }
}

impl Default for MethodTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Forward for MethodTable {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, FacadeError> {
        let f = self.methods.get(method).ok_or_else(|| FacadeError::MethodNotFound {
            key: self.name.clone(),
            method: method.to_string(),
        })?;
        f(args).map_err(FacadeError::Service)
    }

    fn methods(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }
}
