//! Layered configuration for strongbox.
//!
//! Layers, lowest priority first:
//! 1. built-in defaults ([`Config::default`]);
//! 2. a config file (TOML, YAML or JSON, chosen by extension);
//! 3. `STRONGBOX_` environment variables, with `__` separating nested keys
//!    (`STRONGBOX_CACHE__URL=redis://cache:6379`).

pub mod error;

use crate::error::{Error, ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const ENV_PREFIX: &str = "STRONGBOX_";
const CONFIG_FILE_NAME: &str = "strongbox.toml";
/// Shortest accepted JWT signing secret, in bytes.
const MIN_JWT_SECRET_LEN: usize = 32;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "strongbox")
}

/// Default location of the config file (`strongbox.toml` in the platform
/// config directory), if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn default_data_dir() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from("strongbox-data"), |dirs| dirs.data_dir().to_path_buf())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_data_dir().join("strongbox.db") }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub url: String,
    pub password: Option<String>,
    pub database: u8,
    pub pool_size: usize,
    pub connect_timeout_ms: u64,
    pub ttl: TtlConfig,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://localhost:6379".to_string(),
            password: None,
            database: 0,
            pool_size: 4,
            connect_timeout_ms: 2_000,
            ttl: TtlConfig::default(),
        }
    }
}
impl CacheConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Cache entry lifetimes, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub user_by_id: u64,
    pub user_by_email: u64,
    pub document: u64,
    pub share: u64,
    pub document_list: u64,
}
impl Default for TtlConfig {
    fn default() -> Self {
        Self { user_by_id: 30 * 60, user_by_email: 15 * 60, document: 60 * 60, share: 10 * 60, document_list: 5 * 60 }
    }
}
impl TtlConfig {
    /// Describe every place the configured lifetimes break the expected
    /// ordering: identity by id, then by email, then shares, then list
    /// snapshots, each no longer-lived than the one before.
    pub fn tiering_violations(&self) -> Vec<String> {
        let tiers = [
            ("user_by_id", self.user_by_id),
            ("user_by_email", self.user_by_email),
            ("share", self.share),
            ("document_list", self.document_list),
        ];
        tiers
            .windows(2)
            .filter(|pair| pair[0].1 < pair[1].1)
            .map(|pair| {
                let ((longer, longer_secs), (shorter, shorter_secs)) = (pair[0], pair[1]);
                format!("cache.ttl.{shorter} ({shorter_secs}s) outlives cache.ttl.{longer} ({longer_secs}s)")
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket that document blobs are written to.
    pub bucket: String,
    pub local: LocalStorageConfig,
    /// When present, S3 is tried first and the local backend is the fallback.
    pub s3: Option<S3Config>,
}
impl Default for StorageConfig {
    fn default() -> Self {
        Self { bucket: "documents".to_string(), local: LocalStorageConfig::default(), s3: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStorageConfig {
    pub root: PathBuf,
}
impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self { root: default_data_dir().join("blobs") }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Overrides `storage.bucket` for the S3 backend only.
    pub bucket: Option<String>,
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...).
    pub endpoint: Option<String>,
    /// Key prefix prepended to every object key.
    pub prefix: Option<String>,
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: u32,
}
impl Default for AuthConfig {
    fn default() -> Self {
        Self { jwt_secret: String::new(), token_ttl_hours: 24 }
    }
}
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .finish()
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> Error {
    exn::Exn::from(ErrorKind::Invalid { key, reason: reason.into() })
}

impl Config {
    /// Load and validate configuration.
    ///
    /// An explicit `file` must exist. Without one, the default location is
    /// used if a file is there and skipped otherwise.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// The merged provider stack, before extraction.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        match file {
            Some(path) if !path.exists() => exn::bail!(ErrorKind::FileNotFound(path.to_path_buf())),
            Some(path) => figment = merge_file(figment, path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => figment = merge_file(figment, &path)?,
                None => debug!("no config file found, using defaults and environment"),
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Reject values that can never work. TTL orderings that are merely
    /// unusual are logged and kept.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(invalid("auth.jwt_secret", format!("must be at least {MIN_JWT_SECRET_LEN} bytes")));
        }
        if self.auth.token_ttl_hours == 0 {
            return Err(invalid("auth.token_ttl_hours", "must be greater than zero"));
        }
        if self.cache.enabled && self.cache.url.trim().is_empty() {
            return Err(invalid("cache.url", "must not be empty while the cache is enabled"));
        }
        if self.cache.pool_size == 0 {
            return Err(invalid("cache.pool_size", "must be greater than zero"));
        }
        let ttl = &self.cache.ttl;
        for (key, value) in [
            ("cache.ttl.user_by_id", ttl.user_by_id),
            ("cache.ttl.user_by_email", ttl.user_by_email),
            ("cache.ttl.document", ttl.document),
            ("cache.ttl.share", ttl.share),
            ("cache.ttl.document_list", ttl.document_list),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be greater than zero"));
            }
        }
        for violation in ttl.tiering_violations() {
            warn!("{violation}; keeping the configured value");
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(invalid("storage.bucket", "must not be empty"));
        }
        if let Some(s3) = &self.storage.s3 {
            if s3.region.trim().is_empty() {
                return Err(invalid("storage.s3.region", "must not be empty"));
            }
            if s3.key_id.is_some() != s3.key_secret.is_some() {
                return Err(invalid("storage.s3.key_id", "key_id and key_secret must be set together"));
            }
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    debug!(path = %path.display(), "loading configuration file");
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}
