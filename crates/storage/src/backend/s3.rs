//! S3-compatible blob backend.
//!
//! Works against AWS S3, MinIO, Backblaze B2, Tigris and other services
//! speaking the S3 API.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file
//! (`key_id` and `key_secret`).

use crate::backend::{BlobReader, read_exact_size};
use crate::error::{ErrorKind, Result};
use crate::models::BlobHandle;
use crate::{BlobStore, validate_bucket, validate_key};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
};
use exn::ResultExt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;
/// The one region where `CreateBucket` must not carry a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible blob backend.
///
/// Buckets map directly onto S3 buckets. Keys are optionally nested under a
/// configured prefix.
///
/// # Examples
///
/// ```no_run
/// use strongbox_storage::backend::S3Backend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "minio",
///     Some("strongbox/".to_string()),
///     "us-east-1",
///     Some("http://localhost:9000"),
///     "access_key_id",
///     "secret_access_key",
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    region: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 blob backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - Access key ID
    /// * `key_secret` - Secret access key
    pub fn new(
        name: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let region = region.into();
        let credentials = Credentials::new(key_id, key_secret, None, None, "strongbox-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.clone()))
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (MinIO, Backblaze, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let client = Client::from_conf(config_builder.build());
        Self::from_client(name, client, region, prefix)
    }

    /// Wrap an already configured client.
    pub fn from_client(
        name: impl Into<String>,
        client: Client,
        region: impl Into<String>,
        prefix: Option<String>,
    ) -> Result<Self> {
        let prefix = prefix.map(|p| validate_key(&p)).transpose()?;
        Ok(Self {
            name: name.into(),
            client,
            region: region.into(),
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from a relative key.
    fn full_key(&self, key: &str) -> Result<String> {
        let validated = validate_key(key)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{validated}"),
            None => validated,
        })
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    fn network(err: impl std::error::Error) -> ErrorKind {
        ErrorKind::Network(DisplayErrorContext(err).to_string())
    }
}

#[async_trait]
impl BlobStore for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, bucket: &str) -> Result<()> {
        let bucket = validate_bucket(bucket)?;
        let _permit = self.acquire_permit().await?;
        let err = match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };
        if !err.as_service_error().is_some_and(|e| e.is_not_found()) {
            exn::bail!(ErrorKind::Unavailable(DisplayErrorContext(&err).to_string()));
        }
        tracing::info!(target = self.name(), bucket, "Bucket does not exist; creating it");
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != DEFAULT_REGION {
            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let configuration = CreateBucketConfiguration::builder().location_constraint(constraint).build();
            request = request.create_bucket_configuration(configuration);
        }
        request.send().await.map_err(|e| ErrorKind::Unavailable(DisplayErrorContext(&e).to_string()))?;
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
        let bucket = validate_bucket(bucket)?;
        let full_key = self.full_key(key)?;
        let content_length = i64::try_from(size).map_err(|_| ErrorKind::SizeMismatch { expected: size, actual: 0 })?;
        // PutObject needs a known-length body; the size ceiling enforced by
        // callers keeps this buffer bounded.
        // TODO: switch to multipart uploads so large documents stream in parts.
        let data = read_exact_size(body, size).await?;
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(&full_key)
            .content_type(content_type)
            .content_length(content_length)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(Self::network)?;
        tracing::debug!(target = self.name(), bucket, key = %full_key, size, "Stored blob in S3");
        Ok(BlobHandle {
            backend: self.name.clone(),
            bucket: bucket.to_string(),
            key: validate_key(key)?,
            size,
        })
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<BlobReader> {
        let bucket = validate_bucket(bucket)?;
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object().bucket(bucket).key(&full_key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(key.to_string()))
            },
            Err(err) => return Err(Self::network(err).into()),
        };
        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let bucket = validate_bucket(bucket)?;
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        // S3 reports success for keys that don't exist.
        self.client.delete_object().bucket(bucket).key(&full_key).send().await.map_err(Self::network)?;
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let bucket = validate_bucket(bucket)?;
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(bucket).key(&full_key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(Self::network(err).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::operation::delete_object::DeleteObjectOutput;
    use aws_sdk_s3::operation::get_object::{GetObjectError, GetObjectOutput};
    use aws_sdk_s3::operation::head_object::HeadObjectError;
    use aws_sdk_s3::operation::put_object::PutObjectOutput;
    use aws_sdk_s3::types::error::{NoSuchKey, NotFound};
    use aws_smithy_mocks::{mock, mock_client};

    fn backend(client: Client, prefix: Option<&str>) -> S3Backend {
        S3Backend::from_client("s3", client, "us-east-1", prefix.map(String::from)).unwrap()
    }

    #[test]
    fn test_full_key_prefix_handling() {
        let rule = mock!(Client::delete_object).then_output(|| DeleteObjectOutput::builder().build());
        let client = mock_client!(aws_sdk_s3, [&rule]);
        assert_eq!(backend(client.clone(), None).full_key("u/doc.pdf").unwrap(), "u/doc.pdf");
        assert_eq!(backend(client.clone(), Some("strongbox")).full_key("u/doc.pdf").unwrap(), "strongbox/u/doc.pdf");
        assert_eq!(backend(client.clone(), Some("strongbox/")).full_key("u/doc.pdf").unwrap(), "strongbox/u/doc.pdf");
        assert!(backend(client, None).full_key("../doc.pdf").is_err());
    }

    #[tokio::test]
    async fn test_upload_puts_object_with_length() {
        let rule = mock!(Client::put_object)
            .match_requests(|req| {
                req.bucket() == Some("documents")
                    && req.key() == Some("strongbox/u/doc.txt")
                    && req.content_length() == Some(5)
                    && req.content_type() == Some("text/plain")
            })
            .then_output(|| PutObjectOutput::builder().build());
        let client = mock_client!(aws_sdk_s3, [&rule]);
        let s3 = backend(client, Some("strongbox"));
        let handle = s3.upload("documents", "u/doc.txt", Box::pin(&b"hello"[..]), 5, "text/plain").await.unwrap();
        assert_eq!(handle.key, "u/doc.txt");
        assert_eq!(rule.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_upload_size_mismatch_never_calls_s3() {
        let rule = mock!(Client::put_object).then_output(|| PutObjectOutput::builder().build());
        let client = mock_client!(aws_sdk_s3, [&rule]);
        let s3 = backend(client, None);
        let err = s3.upload("documents", "doc.txt", Box::pin(&b"hello"[..]), 9, "text/plain").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::SizeMismatch { expected: 9, actual: 5 }));
        assert_eq!(rule.num_calls(), 0);
    }

    #[tokio::test]
    async fn test_download() {
        let rule = mock!(Client::get_object)
            .then_output(|| GetObjectOutput::builder().body(ByteStream::from_static(b"content")).build());
        let client = mock_client!(aws_sdk_s3, [&rule]);
        let data = backend(client, None).read("documents", "doc.txt").await.unwrap();
        assert_eq!(data, b"content");
    }

    #[tokio::test]
    async fn test_download_not_found() {
        let rule = mock!(Client::get_object).then_error(|| GetObjectError::NoSuchKey(NoSuchKey::builder().build()));
        let client = mock_client!(aws_sdk_s3, [&rule]);
        let err = backend(client, None).download("documents", "missing.txt").await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::NotFound(key) if key == "missing.txt"));
    }

    #[tokio::test]
    async fn test_exists_not_found() {
        let rule = mock!(Client::head_object).then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let client = mock_client!(aws_sdk_s3, [&rule]);
        assert!(!backend(client, None).exists("documents", "missing.txt").await.unwrap());
    }
}
