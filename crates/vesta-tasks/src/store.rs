//! Transient per-operation state store
//!
//! The only shared mutable state across phases. Keyed by the externally
//! supplied operation id; entries must be removed on both completion and
//! cancellation, so the store is bounded and treated as a resource needing
//! guaranteed release.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Transient store errors
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    /// The store holds its maximum number of in-flight operations
    #[error("transient store at capacity ({0} entries)")]
    CapacityExceeded(usize),
}

/// Bounded concurrent key-value store for in-flight phased operations.
pub struct TransientStore {
    entries: RwLock<HashMap<String, Value>>,
    capacity: usize,
}

impl TransientStore {
    /// Default maximum number of in-flight operations.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Create a store with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create a store with an explicit capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Store (or replace) the state of an operation.
    pub async fn put(&self, operation_id: &str, state: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(operation_id) && entries.len() >= self.capacity {
            return Err(StoreError::CapacityExceeded(self.capacity));
        }
        entries.insert(operation_id.to_string(), state);
        Ok(())
    }

    /// Read an operation's state without removing it.
    pub async fn get(&self, operation_id: &str) -> Option<Value> {
        self.entries.read().await.get(operation_id).cloned()
    }

    /// Remove and return an operation's state.
    pub async fn take(&self, operation_id: &str) -> Option<Value> {
        let removed = self.entries.write().await.remove(operation_id);
        if removed.is_some() {
            debug!(operation_id = %operation_id, "transient state released");
        }
        removed
    }

    /// Remove an operation's state, ignoring whether it existed.
    pub async fn remove(&self, operation_id: &str) {
        let _ = self.take(operation_id).await;
    }

    /// Number of in-flight operations.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when no operation is in flight.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for TransientStore {
    fn default() -> Self {
        Self::new()
    }
}
