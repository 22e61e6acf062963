//! Cache backend trait and implementations.

mod memory;
mod redis;

pub use self::memory::MemoryBackend;
pub use self::redis::{RedisBackend, RedisOptions};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Raw string-valued key-value store with per-entry TTL.
///
/// Implementations must be safe for concurrent use. None of the methods
/// treat an absent key as an error: `get` reports a miss with `None` and
/// `delete` of an absent key succeeds.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Name of the backend (used for logging only).
    fn name(&self) -> &str;

    /// Store `value` under `key`, replacing any existing entry. The entry
    /// expires after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Fetch the value stored under `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`. Removing an absent key is a no-op.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every key matching the glob `pattern`, returning how many were
    /// removed.
    ///
    /// Keys must be enumerated incrementally in bounded pages; a single
    /// blocking pass over the whole keyspace is never acceptable.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;

    /// Check whether `key` currently holds an unexpired value.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Round-trip to the backing store.
    async fn ping(&self) -> Result<()>;
}
