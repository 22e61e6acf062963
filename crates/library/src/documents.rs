//! Document lifecycle: upload, listing, download and deletion.
//!
//! Bytes go to the blob store, metadata to the relational store. The order
//! of the two writes is fixed so that a store row never points at a blob
//! that was not fully written:
//!
//! - upload writes the blob first and the row second, and removes the blob
//!   again if the row cannot be written;
//! - delete removes the blob first (best-effort) and the row second.

use crate::digest::HashingReader;
use crate::error::{ErrorKind, Result};
use crate::repository::CachedRepository;
use crate::validate;
use strongbox_storage::{BackendHandle, BlobReader};
use strongbox_store::Document;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What the client says it is uploading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub filename: String,
    pub mime_type: String,
    /// Declared length of the body, in bytes.
    pub size: u64,
}

#[derive(Clone)]
pub struct DocumentManager {
    repo: CachedRepository,
    blobs: BackendHandle,
    bucket: String,
}

impl std::fmt::Debug for DocumentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentManager")
            .field("blobs", &self.blobs.name())
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl DocumentManager {
    pub fn new(repo: CachedRepository, blobs: BackendHandle, bucket: impl Into<String>) -> Self {
        Self { repo, blobs, bucket: bucket.into() }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store a new document for `owner_id`.
    ///
    /// The body is checksummed while it streams into the blob store. A body
    /// that is shorter or longer than `upload.size` fails the upload.
    #[instrument(skip_all, fields(owner = %owner_id, filename = %upload.filename, size = upload.size))]
    pub async fn upload(&self, owner_id: Uuid, upload: NewDocument, body: BlobReader) -> Result<Document> {
        let mime_type = validate::file(upload.size, &upload.mime_type)?;
        let extension = validate::filename(&upload.filename)?;

        let id = Uuid::new_v4();
        let key = format!("{owner_id}/{id}.{extension}");
        let (reader, digest) = HashingReader::new(body, validate::MAX_FILE_SIZE);
        let handle = self
            .blobs
            .upload(&self.bucket, &key, Box::pin(reader), upload.size, &mime_type)
            .await
            .map_err(ErrorKind::blob)?;

        if digest.bytes() != upload.size {
            self.discard(&handle.key).await;
            exn::bail!(ErrorKind::invalid(format!(
                "declared size {} does not match received {} bytes",
                upload.size,
                digest.bytes()
            )));
        }

        let now = self.repo.now();
        let document = Document {
            id,
            owner_id,
            filename: upload.filename,
            storage_key: handle.key,
            size: upload.size,
            mime_type,
            checksum: digest.checksum(),
            created_at: now,
            updated_at: now,
        };
        if let Err(err) = self.repo.create_document(&document).await {
            self.discard(&document.storage_key).await;
            return Err(err);
        }
        info!(document = %document.id, key = %document.storage_key, "document uploaded");
        Ok(document)
    }

    /// Remove a blob that no store row will reference.
    async fn discard(&self, key: &str) {
        if let Err(err) = self.blobs.delete(&self.bucket, key).await {
            warn!(key, error = ?err, "failed to remove orphaned blob");
        }
    }

    /// Metadata of one of `owner_id`'s documents.
    pub async fn get(&self, owner_id: Uuid, document_id: Uuid) -> Result<Document> {
        let document = self.repo.get_document_by_id(document_id).await?;
        if document.owner_id != owner_id {
            exn::bail!(ErrorKind::Unauthorized);
        }
        Ok(document)
    }

    /// Open one of `owner_id`'s documents for reading.
    pub async fn download(&self, owner_id: Uuid, document_id: Uuid) -> Result<(Document, BlobReader)> {
        let document = self.get(owner_id, document_id).await?;
        let body = self.open(&document).await?;
        Ok((document, body))
    }

    pub(crate) async fn open(&self, document: &Document) -> Result<BlobReader> {
        self.blobs.download(&self.bucket, &document.storage_key).await.map_err(ErrorKind::blob)
    }

    /// `owner_id`'s documents, oldest first.
    pub async fn list(&self, owner_id: Uuid) -> Result<Vec<Document>> {
        self.repo.list_documents_by_owner(owner_id).await
    }

    /// Delete one of `owner_id`'s documents along with its shares.
    ///
    /// A blob that cannot be removed is logged and left behind; the document
    /// is deleted regardless.
    #[instrument(skip_all, fields(owner = %owner_id, document = %document_id))]
    pub async fn delete(&self, owner_id: Uuid, document_id: Uuid) -> Result<()> {
        let document = self.repo.get_document_uncached(document_id).await?;
        if document.owner_id != owner_id {
            exn::bail!(ErrorKind::Unauthorized);
        }
        let tokens = self.repo.list_share_tokens(document.id).await?;

        if let Err(err) = self.blobs.delete(&self.bucket, &document.storage_key).await {
            warn!(key = %document.storage_key, error = ?err, "failed to delete blob, continuing");
        }
        if !self.repo.delete_document(&document, &tokens).await? {
            exn::bail!(ErrorKind::NotFound);
        }
        info!(shares = tokens.len(), "document deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::keys::CacheTtls;
    use std::sync::Arc;
    use strongbox_cache::Cache;
    use strongbox_storage::backend::MockBackend;
    use strongbox_store::{Database, Repository, User};
    use time::UtcDateTime;
    use tokio::io::AsyncReadExt;

    const BUCKET: &str = "documents";

    struct Fixture {
        manager: DocumentManager,
        repo: CachedRepository,
        blobs: Arc<MockBackend>,
        owner: User,
    }

    async fn fixture() -> Fixture {
        let db = Database::connect_in_memory().await.unwrap();
        let now = UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now));
        let repo = CachedRepository::new(Repository::from(&db), Cache::memory(), CacheTtls::default(), clock);
        let owner = User::new("ada@example.com", "digest", "Ada Lovelace", now);
        repo.create_user(&owner).await.unwrap();
        let blobs = Arc::new(MockBackend::default());
        let manager = DocumentManager::new(repo.clone(), blobs.clone(), BUCKET);
        Fixture { manager, repo, blobs, owner }
    }

    fn pdf(size: u64) -> NewDocument {
        NewDocument { filename: "Quarterly Report.PDF".to_string(), mime_type: "application/pdf".to_string(), size }
    }

    fn body(bytes: &'static [u8]) -> BlobReader {
        Box::pin(bytes)
    }

    #[tokio::test]
    async fn test_upload_stores_blob_and_row() {
        let f = fixture().await;
        let document = f.manager.upload(f.owner.id, pdf(5), body(b"%PDF-")).await.unwrap();

        assert_eq!(document.storage_key, format!("{}/{}.pdf", f.owner.id, document.id));
        assert_eq!(document.filename, "Quarterly Report.PDF");
        assert_eq!(document.checksum, blake3::hash(b"%PDF-").to_hex().to_string());
        let blob = f.blobs.blob(BUCKET, &document.storage_key).await.unwrap();
        assert_eq!(blob.data, b"%PDF-");
        assert_eq!(blob.content_type, "application/pdf");
        assert_eq!(f.repo.get_document_uncached(document.id).await.unwrap(), document);
    }

    #[tokio::test]
    async fn test_upload_rejects_before_writing() {
        let f = fixture().await;
        let exe = NewDocument { filename: "setup.exe".to_string(), ..pdf(3) };
        let err = f.manager.upload(f.owner.id, exe, body(b"MZ!")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ValidationFailed(_)));

        let empty = f.manager.upload(f.owner.id, pdf(0), body(b"")).await.unwrap_err();
        assert_eq!(*empty, ErrorKind::invalid("file is empty"));
        assert!(f.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_size_mismatch() {
        let f = fixture().await;
        let err = f.manager.upload(f.owner.id, pdf(10), body(b"short")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ValidationFailed(_)));
        assert!(f.blobs.is_empty().await);
        assert!(f.manager.list(f.owner.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_store_failure_removes_blob() {
        let f = fixture().await;
        // No such user: the row violates its foreign key after the blob is written.
        let err = f.manager.upload(Uuid::new_v4(), pdf(5), body(b"%PDF-")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Store);
        assert!(f.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_invalidated_by_upload() {
        let f = fixture().await;
        assert!(f.manager.list(f.owner.id).await.unwrap().is_empty());
        let first = f.manager.upload(f.owner.id, pdf(1), body(b"a")).await.unwrap();
        let second = f.manager.upload(f.owner.id, pdf(1), body(b"b")).await.unwrap();
        assert_eq!(f.manager.list(f.owner.id).await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_get_and_download_are_owner_checked() {
        let f = fixture().await;
        let document = f.manager.upload(f.owner.id, pdf(5), body(b"%PDF-")).await.unwrap();

        let (meta, mut reader) = f.manager.download(f.owner.id, document.id).await.unwrap();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.unwrap();
        assert_eq!((meta, bytes.as_slice()), (document.clone(), &b"%PDF-"[..]));

        let stranger = Uuid::new_v4();
        assert_eq!(*f.manager.get(stranger, document.id).await.unwrap_err(), ErrorKind::Unauthorized);
        assert_eq!(*f.manager.get(f.owner.id, Uuid::new_v4()).await.unwrap_err(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete() {
        let f = fixture().await;
        let document = f.manager.upload(f.owner.id, pdf(5), body(b"%PDF-")).await.unwrap();
        f.manager.get(f.owner.id, document.id).await.unwrap();

        let stranger = Uuid::new_v4();
        assert_eq!(*f.manager.delete(stranger, document.id).await.unwrap_err(), ErrorKind::Unauthorized);

        f.manager.delete(f.owner.id, document.id).await.unwrap();
        assert!(f.blobs.is_empty().await);
        assert_eq!(*f.manager.get(f.owner.id, document.id).await.unwrap_err(), ErrorKind::NotFound);
        assert_eq!(*f.manager.delete(f.owner.id, document.id).await.unwrap_err(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_survives_blob_failure() {
        let f = fixture().await;
        let document = f.manager.upload(f.owner.id, pdf(5), body(b"%PDF-")).await.unwrap();
        f.blobs.fail_deletes(true);
        f.manager.delete(f.owner.id, document.id).await.unwrap();
        assert_eq!(f.blobs.len().await, 1);
        assert!(f.manager.list(f.owner.id).await.unwrap().is_empty());
    }
}
