//! Blob store trait and implementations.
//!
//! This module defines the [`BlobStore`] trait, which provides a unified
//! interface for blob operations across different backends (local
//! filesystem, S3-compatible services, in-memory for tests).

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, MockBlob};
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::{ErrorKind, Result};
use crate::models::BlobHandle;
use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A `'static` boxed async byte stream, used for both directions.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// Unified interface for blob backends.
///
/// Blobs are addressed by a bucket and a key. Keys must be validated with
/// [`validate_key`](crate::validate_key) and buckets with
/// [`validate_bucket`](crate::validate_bucket) before use; implementations
/// enforce this.
///
/// # Examples
///
/// ```no_run
/// use strongbox_storage::{BlobStore, error::Result};
///
/// async fn copy_blob(store: &dyn BlobStore, from: &str, to: &str) -> Result<u64> {
///     let bytes = store.read("documents", from).await?;
///     let size = bytes.len() as u64;
///     let body = Box::pin(std::io::Cursor::new(bytes));
///     let handle = store.upload("documents", to, body, size, "application/pdf").await?;
///     Ok(handle.size)
/// }
/// ```
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Check that the backend is reachable and that `bucket` is usable,
    /// creating the bucket if the backend supports it.
    ///
    /// Used once at startup to decide which backend to bind.
    async fn probe(&self, bucket: &str) -> Result<()>;

    /// Stream `body` into the blob at `(bucket, key)`.
    ///
    /// The upload fails with [`SizeMismatch`](ErrorKind::SizeMismatch) when
    /// the stream yields a different number of bytes than `size`. A failed
    /// or cancelled upload never leaves a readable blob at `key`.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: BlobReader,
        size: u64,
        content_type: &str,
    ) -> Result<BlobHandle>;

    /// Open a blob for streaming reads.
    ///
    /// Returns [`NotFound`](ErrorKind::NotFound) if the blob does not exist.
    async fn download(&self, bucket: &str, key: &str) -> Result<BlobReader>;

    /// Delete a blob.
    ///
    /// Idempotent: deleting a blob that does not exist succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Check if a blob exists.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Read a whole blob into memory.
    ///
    /// Default implementation drains [`download()`](Self::download).
    async fn read(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let mut reader = self.download(bucket, key).await?;
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.map_err(ErrorKind::Io)?;
        Ok(buffer)
    }
}

/// Drain at most `size + 1` bytes from `body`, failing unless exactly
/// `size` bytes arrive. Shared by the backends that buffer uploads.
#[cfg(any(feature = "mock", feature = "s3"))]
pub(crate) async fn read_exact_size(body: BlobReader, size: u64) -> Result<Vec<u8>> {
    let capacity = usize::try_from(size).map_err(|_| ErrorKind::SizeMismatch { expected: size, actual: 0 })?;
    let mut buffer = Vec::with_capacity(capacity);
    body.take(size.saturating_add(1)).read_to_end(&mut buffer).await.map_err(ErrorKind::Io)?;
    let actual = buffer.len() as u64;
    if actual != size {
        exn::bail!(ErrorKind::SizeMismatch { expected: size, actual });
    }
    Ok(buffer)
}

#[cfg(all(test, any(feature = "mock", feature = "s3")))]
mod tests {
    use super::*;

    fn reader(data: &'static [u8]) -> BlobReader {
        Box::pin(data)
    }

    #[tokio::test]
    async fn test_read_exact_size() {
        assert_eq!(read_exact_size(reader(b"hello"), 5).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_read_exact_size_short_stream() {
        let err = read_exact_size(reader(b"hi"), 5).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::SizeMismatch { expected: 5, actual: 2 }));
    }

    #[tokio::test]
    async fn test_read_exact_size_long_stream() {
        let err = read_exact_size(reader(b"hello world"), 5).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::SizeMismatch { expected: 5, actual: 6 }));
    }
}
