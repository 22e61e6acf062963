use crate::error::{ErrorKind, Result};
use crate::{BackendHandle, MemoryBackend, RedisBackend, RedisOptions};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Cache capability, decided once at startup.
///
/// A disabled cache is always cold: reads miss, writes and deletes succeed
/// without doing anything. Only [`Cache::ping`] reports that it is disabled,
/// so health checks can tell the two states apart.
#[derive(Clone)]
pub enum Cache {
    Enabled(BackendHandle),
    Disabled,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled(backend) => f.debug_tuple("Enabled").field(&backend.name()).finish(),
            Self::Disabled => f.write_str("Disabled"),
        }
    }
}

impl Cache {
    /// Connect to Redis, falling back to [`Cache::Disabled`] when it can't be
    /// reached.
    ///
    /// Never fails: a cache outage at startup degrades every read to the
    /// database instead of preventing the process from starting.
    pub async fn connect(options: &RedisOptions) -> Self {
        match RedisBackend::connect(options).await {
            Ok(backend) => Self::Enabled(Arc::new(backend)),
            Err(err) => {
                warn!(url = %options.url, error = ?err, "cache unavailable, continuing without it");
                Self::Disabled
            },
        }
    }

    /// Process-local cache, for tests and single-process deployments.
    pub fn memory() -> Self {
        Self::Enabled(Arc::new(MemoryBackend::new()))
    }

    pub fn from_backend(backend: BackendHandle) -> Self {
        info!(backend = backend.name(), "cache enabled");
        Self::Enabled(backend)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            Self::Enabled(backend) => backend.get(key).await,
            Self::Disabled => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        match self {
            Self::Enabled(backend) => backend.set(key, value, ttl).await,
            Self::Disabled => Ok(()),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Self::Enabled(backend) => backend.delete(key).await,
            Self::Disabled => Ok(()),
        }
    }

    /// Remove every key matching a Redis glob pattern.
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        match self {
            Self::Enabled(backend) => backend.delete_pattern(pattern).await,
            Self::Disabled => Ok(0),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self {
            Self::Enabled(backend) => backend.exists(key).await,
            Self::Disabled => Ok(false),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match self {
            Self::Enabled(backend) => backend.ping().await,
            Self::Disabled => exn::bail!(ErrorKind::Disabled),
        }
    }

    /// Fetch and decode a JSON value.
    ///
    /// A value that no longer decodes (for example after a schema change) is
    /// reported as [`ErrorKind::InvalidData`]; callers treat it as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw).or_raise(|| ErrorKind::InvalidData(key.to_string()))?;
        Ok(Some(value))
    }

    /// Encode a value as JSON and store it.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let raw = serde_json::to_string(value).or_raise(|| ErrorKind::InvalidData(key.to_string()))?;
        self.set(key, raw, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const TTL: Duration = Duration::from_secs(60);

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        email: String,
        active: bool,
    }

    #[tokio::test]
    async fn test_json_roundtrip() {
        let cache = Cache::memory();
        let profile = Profile { email: "a@example.com".to_string(), active: true };
        cache.set_json("user:id:1", &profile, TTL).await.unwrap();
        let loaded: Option<Profile> = cache.get_json("user:id:1").await.unwrap();
        assert_eq!(loaded, Some(profile));
        assert_eq!(cache.get_json::<Profile>("user:id:2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_undecodable_value_is_invalid_data() {
        let cache = Cache::memory();
        cache.set("user:id:1", "{not json".to_string(), TTL).await.unwrap();
        let err = cache.get_json::<Profile>("user:id:1").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(key) if key == "user:id:1"));
    }

    #[tokio::test]
    async fn test_disabled_is_always_cold() {
        let cache = Cache::Disabled;
        assert!(!cache.is_enabled());
        cache.set("k", "v".to_string(), TTL).await.unwrap();
        cache.set_json("j", &[1, 2, 3], TTL).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.get_json::<Vec<u8>>("j").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
        cache.delete("k").await.unwrap();
        assert_eq!(cache.delete_pattern("*").await.unwrap(), 0);
        let err = cache.ping().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Disabled));
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_disabled() {
        let options = RedisOptions {
            url: "127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(200),
            ..RedisOptions::default()
        };
        let cache = Cache::connect(&options).await;
        assert!(!cache.is_enabled());
        assert_eq!(format!("{cache:?}"), "Disabled");
    }

    #[tokio::test]
    async fn test_delete_pattern_through_capability() {
        let cache = Cache::memory();
        cache.set("share:token:a", "1".to_string(), TTL).await.unwrap();
        cache.set("document:id:a", "1".to_string(), TTL).await.unwrap();
        assert_eq!(cache.delete_pattern("share:*").await.unwrap(), 1);
        assert!(cache.exists("document:id:a").await.unwrap());
        cache.ping().await.unwrap();
    }
}
