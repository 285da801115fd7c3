#![deny(missing_docs)]
//! The engine's persisted state: a flat key-value store preserved across
//! Tasks (§6, "Persisted state").
//!
//! Unlike the richer multi-scope, search-capable state protocol this
//! crate's `KvStore` trait is descended from, this spec has no scoping
//! and no search requirement — just `store(k, v)` / `retrieve(k)`.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from key-value store operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum KvError {
    /// Catch-all for backend-specific failures (I/O, serialization, etc.).
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A flat key-value store preserved across Tasks.
///
/// Implementations: [`MemoryKvStore`] (testing, ephemeral). An embedder
/// wanting durability across process restarts, or at-rest encryption of
/// the stored `api_key` blob, provides its own implementation — neither
/// is implemented by this crate.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store a value under `key`, overwriting any prior value.
    async fn store(&self, key: &str, value: serde_json::Value) -> Result<(), KvError>;

    /// Retrieve the value stored under `key`, or `None` if absent.
    async fn retrieve(&self, key: &str) -> Result<Option<serde_json::Value>, KvError>;

    /// Remove the value stored under `key`. No-op if absent.
    async fn remove(&self, key: &str) -> Result<(), KvError>;
}

/// In-memory `KvStore` backed by a `HashMap` behind a `tokio::sync::RwLock`.
#[derive(Default)]
pub struct MemoryKvStore {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryKvStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn store(&self, key: &str, value: serde_json::Value) -> Result<(), KvError> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<serde_json::Value>, KvError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        self.data.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let kv = MemoryKvStore::new();
        kv.store("k", json!({"v": 1})).await.unwrap();
        assert_eq!(kv.retrieve("k").await.unwrap(), Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn retrieve_missing_key_is_none_not_error() {
        let kv = MemoryKvStore::new();
        assert_eq!(kv.retrieve("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_overwrites_prior_value() {
        let kv = MemoryKvStore::new();
        kv.store("k", json!(1)).await.unwrap();
        kv.store("k", json!(2)).await.unwrap();
        assert_eq!(kv.retrieve("k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn remove_deletes_the_key() {
        let kv = MemoryKvStore::new();
        kv.store("k", json!(1)).await.unwrap();
        kv.remove("k").await.unwrap();
        assert_eq!(kv.retrieve("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_missing_key_is_a_no_op() {
        let kv = MemoryKvStore::new();
        assert!(kv.remove("missing").await.is_ok());
    }
}
