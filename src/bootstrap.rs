//! Turn a [`Config`] into live handles.
//!
//! Each external dependency is bound once here and kept for the life of the
//! process: the cache is either connected or disabled, and exactly one blob
//! backend is chosen.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use strongbox_auth::{Argon2Hasher, JwtTokenService};
use strongbox_cache::{Cache, RedisOptions};
use strongbox_config::{CacheConfig, Config, StorageConfig};
use strongbox_library::{CacheTtls, HasherHandle, Parts, Strongbox, SystemClock, TokenServiceHandle};
use strongbox_storage::{BackendHandle, BlobStore};
use strongbox_storage::backend::LocalBackend;
use strongbox_store::{Database, Repository};
use tracing::{info, warn};

pub struct App {
    pub strongbox: Strongbox,
    pub db: Database,
    pub cache: Cache,
    pub blobs: BackendHandle,
    pub bucket: String,
}

pub async fn start(config: &Config) -> Result<App> {
    let db = Database::connect(&config.database.path).await.or_raise(|| ErrorKind::Startup("database"))?;
    let cache = connect_cache(&config.cache).await;
    let (blobs, bucket) = bind_storage(&config.storage).await?;

    let hasher: HasherHandle = Arc::new(Argon2Hasher::default());
    let tokens: TokenServiceHandle = Arc::new(
        JwtTokenService::new(config.auth.jwt_secret.as_bytes()).or_raise(|| ErrorKind::Startup("token service"))?,
    );
    let strongbox = Strongbox::new(Parts {
        store: Repository::from(&db),
        cache: cache.clone(),
        ttl: cache_ttls(&config.cache),
        blobs: Arc::clone(&blobs),
        bucket: bucket.clone(),
        hasher,
        tokens,
        clock: Arc::new(SystemClock),
    });
    let session_ttl = time::Duration::hours(i64::from(config.auth.token_ttl_hours));
    let strongbox = Strongbox { accounts: strongbox.accounts.with_session_ttl(session_ttl), ..strongbox };
    Ok(App { strongbox, db, cache, blobs, bucket })
}

async fn connect_cache(config: &CacheConfig) -> Cache {
    if !config.enabled {
        info!("cache disabled by configuration");
        return Cache::Disabled;
    }
    let options = RedisOptions {
        url: config.url.clone(),
        password: config.password.clone(),
        database: config.database,
        pool_size: config.pool_size,
        connect_timeout: config.connect_timeout(),
    };
    Cache::connect(&options).await
}

pub fn cache_ttls(config: &CacheConfig) -> CacheTtls {
    let ttl = &config.ttl;
    CacheTtls {
        user_by_id: Duration::from_secs(ttl.user_by_id),
        user_by_email: Duration::from_secs(ttl.user_by_email),
        document: Duration::from_secs(ttl.document),
        share: Duration::from_secs(ttl.share),
        document_list: Duration::from_secs(ttl.document_list),
    }
}

/// Pick the blob backend: S3 when configured and reachable, the local
/// filesystem otherwise.
async fn bind_storage(config: &StorageConfig) -> Result<(BackendHandle, String)> {
    #[cfg(feature = "s3")]
    if let Some(s3) = &config.s3 {
        let bucket = s3.bucket.clone().unwrap_or_else(|| config.bucket.clone());
        match connect_s3(s3, &bucket).await {
            Ok(backend) => {
                info!(backend = "s3", %bucket, "blob storage bound");
                return Ok((backend, bucket));
            },
            Err(err) => warn!(error = ?err, "S3 unavailable, falling back to local storage"),
        }
    }
    #[cfg(not(feature = "s3"))]
    if config.s3.is_some() {
        warn!("S3 is configured but support was not compiled in, using local storage");
    }

    let backend: BackendHandle = Arc::new(local_backend(&config.local.root)?);
    backend.probe(&config.bucket).await.or_raise(|| ErrorKind::Startup("local storage"))?;
    info!(backend = "local", root = %config.local.root.display(), bucket = %config.bucket, "blob storage bound");
    Ok((backend, config.bucket.clone()))
}

fn local_backend(root: &Path) -> Result<LocalBackend> {
    let root = std::path::absolute(root).or_raise(|| ErrorKind::Startup("local storage"))?;
    LocalBackend::new("local", root).or_raise(|| ErrorKind::Startup("local storage"))
}

#[cfg(feature = "s3")]
async fn connect_s3(config: &strongbox_config::S3Config, bucket: &str) -> Result<BackendHandle> {
    use strongbox_storage::backend::S3Backend;
    let (Some(key_id), Some(key_secret)) = (&config.key_id, &config.key_secret) else {
        exn::bail!(ErrorKind::Startup("S3 credentials are not configured"));
    };
    let backend = S3Backend::new(
        "s3",
        config.prefix.clone(),
        &config.region,
        config.endpoint.as_deref(),
        key_id,
        key_secret,
    )
    .or_raise(|| ErrorKind::Startup("S3 storage"))?;
    backend.probe(bucket).await.or_raise(|| ErrorKind::Startup("S3 storage"))?;
    Ok(Arc::new(backend))
}
