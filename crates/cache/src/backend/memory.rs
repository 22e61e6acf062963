//! Process-local cache backend.
//!
//! Useful for tests and single-process deployments without Redis. Expired
//! entries are dropped when they are next touched, and swept from the whole
//! map every `SWEEP_EVERY` writes so keys that are never read again do not
//! accumulate.

use crate::CacheBackend;
use crate::error::Result;
use crate::glob;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Writes between full sweeps of expired entries.
const SWEEP_EVERY: usize = 64;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}
impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory cache backend.
///
/// Entries are stored in a `HashMap` behind a [`RwLock`]. Expiry uses
/// [`tokio::time::Instant`], so tests can drive it with a paused clock.
///
/// # Examples
///
/// ```
/// use strongbox_cache::{CacheBackend, MemoryBackend};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MemoryBackend::default();
/// backend.set("user:id:1", "{}".to_string(), Duration::from_secs(60)).await?;
/// assert_eq!(backend.get("user:id:1").await?.as_deref(), Some("{}"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        guard.insert(key.to_string(), Entry { value, expires_at: now + ttl });
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let before = guard.len();
            guard.retain(|_, entry| entry.is_live(now));
            tracing::trace!(swept = before - guard.len(), "swept expired cache entries");
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        {
            let guard = self.entries.read().await;
            match guard.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {},
            }
        }
        // Re-check under the write lock; another task may have replaced it.
        let mut guard = self.entries.write().await;
        if guard.get(key).is_some_and(|e| !e.is_live(now)) {
            guard.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let matcher = glob::compile(pattern)?;
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        let before = guard.len();
        let mut expired = 0;
        guard.retain(|key, entry| {
            let matched = matcher.is_match(key);
            if matched && !entry.is_live(now) {
                expired += 1;
            }
            !matched
        });
        Ok((before - guard.len() - expired) as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self.entries.read().await.get(key).is_some_and(|e| e.is_live(now)))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = MemoryBackend::new();
        backend.set("k", "v".to_string(), MINUTE).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(backend.exists("k").await.unwrap());
        backend.delete("k").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
        // Deleting an absent key is not an error
        backend.delete("k").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let backend = MemoryBackend::new();
        backend.set("short", "v".to_string(), Duration::from_secs(5)).await.unwrap();
        backend.set("long", "v".to_string(), MINUTE).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(backend.get("short").await.unwrap(), None);
        assert!(!backend.exists("short").await.unwrap());
        assert_eq!(backend.get("long").await.unwrap().as_deref(), Some("v"));
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let backend = MemoryBackend::new();
        for key in ["share:token:a", "share:token:b", "user:id:1", "document:id:1"] {
            backend.set(key, "v".to_string(), MINUTE).await.unwrap();
        }
        assert_eq!(backend.delete_pattern("share:*").await.unwrap(), 2);
        assert!(!backend.exists("share:token:a").await.unwrap());
        assert!(backend.exists("user:id:1").await.unwrap());
        // Nothing left to match
        assert_eq!(backend.delete_pattern("share:*").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_pattern_ignores_expired_in_count() {
        let backend = MemoryBackend::new();
        backend.set("share:token:old", "v".to_string(), Duration::from_secs(1)).await.unwrap();
        backend.set("share:token:new", "v".to_string(), MINUTE).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(backend.delete_pattern("share:*").await.unwrap(), 1);
        assert!(backend.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_expired_entries_are_swept() {
        let backend = MemoryBackend::new();
        for i in 0..SWEEP_EVERY - 1 {
            backend.set(&format!("user:id:{i}"), "v".to_string(), Duration::from_secs(1)).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(backend.entries.read().await.len(), SWEEP_EVERY - 1);

        backend.set("user:id:fresh", "v".to_string(), MINUTE).await.unwrap();
        let entries = backend.entries.read().await;
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("user:id:fresh"));
    }

    #[tokio::test]
    async fn test_delete_pattern_invalid() {
        let backend = MemoryBackend::new();
        assert!(backend.delete_pattern("share:[").await.is_err());
    }
}
