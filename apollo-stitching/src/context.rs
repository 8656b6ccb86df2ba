//! Provide a [`Context`] for the resolution of one operation.
//!
//! The context is opaque to type merging: it is handed untouched to every merged type resolver and
//! delegated call, so that services can share request-scoped data (auth, tracing ids, loaders).

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::json_ext::Value;

/// Holds [`Context`] entries.
pub(crate) type Entries = Arc<DashMap<String, Value>>;

/// A map of arbitrary JSON values, shared by every call made while resolving one operation.
///
/// Cloning a context is cheap and clones share their entries.
#[derive(Clone, Debug, Default)]
pub struct Context {
    entries: Entries,
}

impl Context {
    /// Create a new, empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value from the context using the provided key.
    ///
    /// Returns `Ok(None)` if the key is absent and an error if the value cannot be deserialized
    /// into `V`.
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>, serde_json::Error>
    where
        K: Into<String>,
        V: DeserializeOwned,
    {
        self.entries
            .get(&key.into())
            .map(|v| serde_json_bytes::from_value(v.value().clone()))
            .transpose()
    }

    /// Insert a value into the context using the provided key and value.
    ///
    /// Returns the previous value, if there was one.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<Option<V>, serde_json::Error>
    where
        K: Into<String>,
        V: Serialize + DeserializeOwned,
    {
        match serde_json_bytes::to_value(value) {
            Ok(value) => self
                .entries
                .insert(key.into(), value)
                .map(serde_json_bytes::from_value)
                .transpose(),
            Err(e) => Err(e),
        }
    }

    /// Returns true if the context contains a value for the specified key.
    pub fn contains_key<K>(&self, key: K) -> bool
    where
        K: Into<String>,
    {
        self.entries.contains_key(&key.into())
    }
}
