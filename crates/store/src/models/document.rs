use crate::error::{Error, ErrorKind};
use crate::models::{parse_id, parse_timestamp};
use exn::ResultExt;
use time::UtcDateTime;
use uuid::Uuid;

/// Metadata for one stored file. The content itself lives in the blob store
/// under `storage_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Name as supplied by the uploader. Display only; never used as a path.
    pub filename: String,
    pub storage_key: String,
    pub size: u64,
    pub mime_type: String,
    /// BLAKE3 hex digest of the content.
    pub checksum: String,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct DocumentRow {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) filename: String,
    pub(crate) storage_key: String,
    pub(crate) size: i64,
    pub(crate) mime_type: String,
    pub(crate) checksum: String,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}
impl TryFrom<&Document> for DocumentRow {
    type Error = Error;
    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        Ok(Self {
            id: document.id.to_string(),
            owner_id: document.owner_id.to_string(),
            filename: document.filename.clone(),
            storage_key: document.storage_key.clone(),
            size: i64::try_from(document.size).or_raise(|| ErrorKind::InvalidData("document size"))?,
            mime_type: document.mime_type.clone(),
            checksum: document.checksum.clone(),
            created_at: document.created_at.unix_timestamp(),
            updated_at: document.updated_at.unix_timestamp(),
        })
    }
}
impl TryFrom<DocumentRow> for Document {
    type Error = Error;
    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&row.id, "document id")?,
            owner_id: parse_id(&row.owner_id, "document owner")?,
            filename: row.filename,
            storage_key: row.storage_key,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("document size"))?,
            mime_type: row.mime_type,
            checksum: row.checksum,
            created_at: parse_timestamp(row.created_at, "document creation date")?,
            updated_at: parse_timestamp(row.updated_at, "document update date")?,
        })
    }
}
