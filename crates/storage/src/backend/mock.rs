//! In-memory blob backend for testing.

use crate::backend::{BlobReader, read_exact_size};
use crate::error::{ErrorKind, Result};
use crate::models::BlobHandle;
use crate::{BlobStore, validate_bucket, validate_key};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

type BlobKey = (String, String);

/// A stored blob: content type and bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockBlob {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// In-memory blob backend for testing.
///
/// Blobs are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Deletes can be
/// made to fail on demand to exercise best-effort cleanup paths.
///
/// # Examples
///
/// ```
/// use strongbox_storage::backend::MockBackend;
/// use strongbox_storage::BlobStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_blobs([("documents", "owner/a.txt", b"hello")]);
/// assert!(backend.exists("documents", "owner/a.txt").await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<BlobKey, MockBlob>>,
    fail_deletes: AtomicBool,
    fail_probe: AtomicBool,
}

impl MockBackend {
    /// Create a mock backend pre-populated with blobs.
    ///
    /// Panics if any bucket or key fails validation. If test setup is wrong,
    /// then the test should not pass.
    pub fn with_blobs<'a>(blobs: impl IntoIterator<Item = (&'a str, &'a str, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (bucket, key, data) in blobs {
            let (Ok(bucket), Ok(key)) = (validate_bucket(bucket), validate_key(key)) else {
                panic!("MockBackend::with_blobs: invalid location {bucket}/{key}");
            };
            let blob = MockBlob { content_type: "application/octet-stream".to_string(), data: data.into() };
            map.insert((bucket.to_string(), key), blob);
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            fail_deletes: AtomicBool::new(false),
            fail_probe: AtomicBool::new(false),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every subsequent `delete()` fail with a backend error.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `probe()` fail, as an unreachable service would.
    pub fn fail_probe(&self, fail: bool) {
        self.fail_probe.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of a stored blob, for assertions.
    pub async fn blob(&self, bucket: &str, key: &str) -> Option<MockBlob> {
        let key = validate_key(key).ok()?;
        self.storage.read().await.get(&(bucket.to_string(), key)).cloned()
    }

    /// Number of stored blobs across all buckets.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn location(bucket: &str, key: &str) -> Result<BlobKey> {
        Ok((validate_bucket(bucket)?.to_string(), validate_key(key)?))
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let blobs: [(&str, &str, Vec<u8>); 0] = [];
        Self::with_blobs(blobs)
    }
}

#[async_trait]
impl BlobStore for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, bucket: &str) -> Result<()> {
        validate_bucket(bucket)?;
        if self.fail_probe.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unavailable(self.name.clone()));
        }
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: BlobReader,
        size: u64,
        content_type: &str,
    ) -> Result<BlobHandle> {
        let location = Self::location(bucket, key)?;
        let data = read_exact_size(body, size).await?;
        let blob = MockBlob { content_type: content_type.to_string(), data };
        self.storage.write().await.insert(location.clone(), blob);
        Ok(BlobHandle { backend: self.name.clone(), bucket: location.0, key: location.1, size })
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<BlobReader> {
        let location = Self::location(bucket, key)?;
        let blob = self.storage.read().await.get(&location).cloned();
        let blob = blob.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(location.1)))?;
        Ok(Box::pin(Cursor::new(blob.data)))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let location = Self::location(bucket, key)?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::BackendError(format!("refusing to delete {}", location.1)));
        }
        self.storage.write().await.remove(&location);
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let location = Self::location(bucket, key)?;
        Ok(self.storage.read().await.contains_key(&location))
    }
}
