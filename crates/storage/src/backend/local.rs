//! Local filesystem blob backend.
//!
//! Buckets are directories directly under the configured root, keys are
//! relative paths inside them. All I/O goes through `tokio::fs`.

use crate::backend::BlobReader;
use crate::error::{ErrorKind, Result};
use crate::models::BlobHandle;
use crate::path::relative_path;
use crate::{BlobStore, validate_bucket};
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Suffix for in-flight uploads; renamed into place once complete.
const PARTIAL_SUFFIX: &str = ".partial";

/// Local filesystem blob backend.
///
/// # Examples
///
/// ```no_run
/// use strongbox_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/var/lib/strongbox/blobs")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory; buckets are its subdirectories.
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists and is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidKey(root.display().to_string()));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidKey(root.display().to_string()));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root.display().to_string()))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Validates the bucket and key, and joins them with the root directory.
    fn absolute_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(relative_path(bucket, key)?))
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut partial = path.as_os_str().to_owned();
        partial.push(PARTIAL_SUFFIX);
        PathBuf::from(partial)
    }

    fn map_io_error(e: std::io::Error, key: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(key.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(key.to_string()),
            _ => ErrorKind::Io(e),
        }
    }

    async fn write_partial(&self, partial: &Path, key: &str, body: BlobReader, size: u64) -> Result<()> {
        let mut file = fs::File::create(partial).await.map_err(|e| Self::map_io_error(e, key))?;
        // Read one byte past the declared size so over-long streams are caught.
        let mut limited = body.take(size.saturating_add(1));
        let written = tokio::io::copy(&mut limited, &mut file).await.map_err(ErrorKind::Io)?;
        if written != size {
            exn::bail!(ErrorKind::SizeMismatch { expected: size, actual: written });
        }
        file.flush().await.map_err(ErrorKind::Io)?;
        file.sync_all().await.map_err(ErrorKind::Io)?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, bucket: &str) -> Result<()> {
        let directory = self.root.join(validate_bucket(bucket)?);
        fs::create_dir_all(&directory).await.map_err(|e| Self::map_io_error(e, bucket))?;
        // A directory can exist without being writable (read-only mounts).
        let marker = directory.join(".probe");
        fs::write(&marker, b"").await.map_err(|e| Self::map_io_error(e, bucket))?;
        fs::remove_file(&marker).await.map_err(|e| Self::map_io_error(e, bucket))?;
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: BlobReader,
        size: u64,
        _content_type: &str,
    ) -> Result<BlobHandle> {
        let path = self.absolute_path(bucket, key)?;
        // Create parent directories if needed, to keep behaviour consistent
        // with S3-compatible storage.
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, key))?;
        }
        let partial = Self::partial_path(&path);
        if let Err(e) = self.write_partial(&partial, key, body, size).await {
            _ = fs::remove_file(&partial).await;
            return Err(e);
        }
        fs::rename(&partial, &path).await.map_err(|e| Self::map_io_error(e, key))?;
        tracing::debug!(target = self.name(), bucket, key, size, "Stored blob on local filesystem");
        Ok(BlobHandle {
            backend: self.name.clone(),
            bucket: bucket.to_string(),
            key: crate::validate_key(key)?,
            size,
        })
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<BlobReader> {
        let path = self.absolute_path(bucket, key)?;
        let file = fs::File::open(&path).await.map_err(|e| Self::map_io_error(e, key))?;
        Ok(Box::pin(file))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.absolute_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::map_io_error(e, key).into()),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let path = self.absolute_path(bucket, key)?;
        Ok(fs::try_exists(&path).await.map_err(ErrorKind::Io)?)
    }
}
