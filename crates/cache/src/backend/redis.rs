//! Redis cache backend built on a `fred` connection pool.

use crate::CacheBackend;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use fred::clients::Pool;
use fred::interfaces::{ClientLike, KeysInterface};
use fred::types::config::{Config, ReconnectPolicy, ServerConfig};
use fred::types::{Builder, CustomCommand, Expiration};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, trace};

const DEFAULT_PORT: u16 = 6379;
const SCAN_PAGE_SIZE: &str = "100";

/// Connection settings for [`RedisBackend`].
#[derive(Debug, Clone)]
pub struct RedisOptions {
    /// `host[:port]`, optionally prefixed with `redis://` or `rediss://`.
    pub url: String,
    pub password: Option<String>,
    pub database: u8,
    pub pool_size: usize,
    /// Bound on establishing the pool and answering the first `PING`.
    pub connect_timeout: Duration,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            url: format!("localhost:{DEFAULT_PORT}"),
            password: None,
            database: 0,
            pool_size: 4,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Redis-backed cache.
pub struct RedisBackend {
    pool: Pool,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connect a pool and verify it with a `PING`.
    ///
    /// Fails with [`ErrorKind::Connection`] when the server can't be reached
    /// within `options.connect_timeout`. The pool is shut down again before
    /// returning an error.
    pub async fn connect(options: &RedisOptions) -> Result<Self> {
        let (host, port) = parse_host_port(&options.url)?;
        let config = Config {
            server: ServerConfig::new_centralized(host, port),
            password: options.password.clone(),
            database: Some(options.database),
            ..Config::default()
        };
        let connect_timeout = options.connect_timeout;
        let mut builder = Builder::from_config(config);
        builder
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2))
            .with_connection_config(|c| c.connection_timeout = connect_timeout);
        let pool = builder.build_pool(options.pool_size.max(1)).or_raise(|| ErrorKind::Connection)?;

        let handshake = async {
            pool.init().await?;
            pool.ping::<String>(None).await
        };
        match timeout(connect_timeout, handshake).await {
            Ok(Ok(_)) => {
                info!(host, port, database = options.database, "Redis pool initialised");
                Ok(Self { pool })
            },
            Ok(Err(err)) => {
                _ = timeout(connect_timeout, pool.quit()).await;
                Err(err).or_raise(|| ErrorKind::Connection)
            },
            Err(elapsed) => {
                _ = timeout(connect_timeout, pool.quit()).await;
                Err(elapsed).or_raise(|| ErrorKind::Connection)
            },
        }
    }

    /// Close every connection in the pool.
    pub async fn quit(&self) {
        if let Err(err) = self.pool.quit().await {
            debug!(error = %err, "error closing Redis pool");
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        // PX 0 is rejected by the server.
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);
        self.pool
            .set::<(), _, _>(key, value, Some(Expiration::PX(millis)), None, false)
            .await
            .or_raise(|| ErrorKind::Command("SET"))?;
        trace!(key, ttl_ms = millis, "cache set");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.pool.get::<Option<String>, _>(key).await.or_raise(|| ErrorKind::Command("GET"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.pool.del::<i64, _>(key).await.or_raise(|| ErrorKind::Command("DEL"))?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut cursor = "0".to_string();
        let mut removed = 0u64;
        loop {
            let (next, keys) = self
                .pool
                .custom::<(String, Vec<String>), _>(
                    CustomCommand::new_static("SCAN", None::<u16>, false),
                    vec![
                        cursor,
                        "MATCH".to_string(),
                        pattern.to_string(),
                        "COUNT".to_string(),
                        SCAN_PAGE_SIZE.to_string(),
                    ],
                )
                .await
                .or_raise(|| ErrorKind::Command("SCAN"))?;
            if !keys.is_empty() {
                let deleted = self.pool.del::<i64, _>(keys).await.or_raise(|| ErrorKind::Command("DEL"))?;
                removed += u64::try_from(deleted).unwrap_or_default();
            }
            if next == "0" {
                break;
            }
            cursor = next;
        }
        debug!(pattern, removed, "cache keys removed by pattern");
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let count = self.pool.exists::<i64, _>(key).await.or_raise(|| ErrorKind::Command("EXISTS"))?;
        Ok(count > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping::<String>(None).await.or_raise(|| ErrorKind::Command("PING"))?;
        Ok(())
    }
}

/// Split `host[:port]` into its parts, defaulting to port 6379.
///
/// A `redis://` or `rediss://` scheme and any trailing path are ignored.
pub(crate) fn parse_host_port(url: &str) -> Result<(&str, u16)> {
    let endpoint = url.trim_start_matches("rediss://").trim_start_matches("redis://");
    let endpoint = endpoint.split('/').next().unwrap_or(endpoint);
    let endpoint = endpoint.rsplit_once('@').map_or(endpoint, |(_, host)| host);
    let (host, port) = match endpoint.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().or_raise(|| ErrorKind::Connection)?;
            (host, port)
        },
        None => (endpoint, DEFAULT_PORT),
    };
    if host.is_empty() {
        exn::bail!(ErrorKind::Connection);
    }
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("localhost", "localhost", 6379)]
    #[case("cache.internal:6380", "cache.internal", 6380)]
    #[case("redis://cache.internal:6380", "cache.internal", 6380)]
    #[case("rediss://cache.internal", "cache.internal", 6379)]
    #[case("redis://:secret@cache.internal:7000/2", "cache.internal", 7000)]
    fn test_parse_host_port(#[case] url: &str, #[case] host: &str, #[case] port: u16) {
        assert_eq!(parse_host_port(url).unwrap(), (host, port));
    }

    #[rstest]
    #[case("cache.internal:port")]
    #[case("cache.internal:70000")]
    #[case("redis://")]
    #[case(":6379")]
    fn test_parse_host_port_invalid(#[case] url: &str) {
        let err = parse_host_port(url).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Connection));
    }

    #[tokio::test]
    async fn test_connect_unreachable_fails() {
        let options = RedisOptions {
            // Port 1 is reserved; nothing listens there.
            url: "127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(200),
            ..RedisOptions::default()
        };
        let err = RedisBackend::connect(&options).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Connection));
    }
}
