//! # Execution context (orientation)
//!
//! A per-call bag of values threaded through every layer of a pipeline. The
//! common usage is write-once-by-caller, read-by-fallback: the caller labels
//! a call (`"Src" => "A"`) and a fallback handler deep in the chain reads the
//! label to build its substitute result.
//!
//! The context is immutable once built and the handle clones cheaply, so it
//! can cross task boundaries when a pessimistic timeout moves the guarded
//! operation onto its own task. Its lifetime is one `execute` call; it is
//! never persisted or shared across calls.

use std::sync::Arc;

use serde_json::Value;

/// Immutable per-call execution context. Cloning shares the same entries.
#[derive(Clone, Debug, Default)]
pub struct Context {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    operation_key: Option<String>,
    entries: Vec<(String, Value)>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a context with entries and an operation key.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Shortcut for the single-entry case.
    pub fn with(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::builder().insert(key, value).build()
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.shared
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Caller-supplied label for the guarded call, used in logs.
    pub fn operation_key(&self) -> Option<&str> {
        self.shared.operation_key.as_deref()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.shared.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Context {
            shared: Arc::new(Shared {
                operation_key: None,
                entries: iter.into_iter().collect(),
            }),
        }
    }
}

/// Builder for [`Context`]. Duplicate keys are kept in order; lookup returns
/// the first entry for a key.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    operation_key: Option<String>,
    entries: Vec<(String, Value)>,
}

impl ContextBuilder {
    /// Label the guarded call for logs and hooks.
    pub fn operation_key(mut self, key: impl Into<String>) -> Self {
        self.operation_key = Some(key.into());
        self
    }

    /// Add an entry, preserving insertion order.
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    pub fn build(self) -> Context {
        Context {
            shared: Arc::new(Shared {
                operation_key: self.operation_key,
                entries: self.entries,
            }),
        }
    }
}
