//! Key-value store abstraction for the persisted counter table.
//!
//! The limiter keeps its whole counter table under a single key in an
//! external store that supports per-entry TTLs. `MemoryStore` is the
//! in-process implementation.

mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryStore;

/// Trait for TTL-capable key-value stores.
///
/// Implementations only need independent `get`/`set`/`delete`. Stores that
/// can write conditionally should override `set_if_unchanged`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get the value for a key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Write `value` only if the current value still equals `expected`.
    ///
    /// Returns `Ok(false)` when another writer got there first. The default
    /// falls back to an unconditional `set`.
    async fn set_if_unchanged(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool> {
        let _ = expected;
        self.set(key, value, ttl).await?;
        Ok(true)
    }
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn set_if_unchanged(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool> {
        (**self).set_if_unchanged(key, expected, value, ttl).await
    }
}
