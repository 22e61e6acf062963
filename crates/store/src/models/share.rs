use crate::error::{Error, ErrorKind};
use crate::models::{Document, DocumentRow, parse_id, parse_timestamp};
use exn::{OptionExt, ResultExt};
use time::UtcDateTime;
use uuid::Uuid;

/// Upper bound on a share's access ceiling.
pub const MAX_ACCESS_LIMIT: u32 = 10_000;

/// How many times a share may be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessLimit {
    #[default]
    Unlimited,
    Limited(u32),
}

impl AccessLimit {
    /// Interpret the stored column value, where `-1` means unlimited.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            -1 => Some(Self::Unlimited),
            n => u32::try_from(n).ok().filter(|n| *n <= MAX_ACCESS_LIMIT).map(Self::Limited),
        }
    }

    pub fn as_raw(self) -> i64 {
        match self {
            Self::Unlimited => -1,
            Self::Limited(n) => i64::from(n),
        }
    }

    /// Whether a share that has been opened `count` times may be opened again.
    pub fn allows(self, count: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(max) => count < max,
        }
    }
}

/// A public link to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Opaque, unguessable lookup key. Globally unique.
    pub token: String,
    pub expires_at: UtcDateTime,
    pub access_limit: AccessLimit,
    pub access_count: u32,
    pub password_hash: Option<String>,
    pub created_by: Uuid,
    pub created_at: UtcDateTime,
}

impl Share {
    /// Expiry is inclusive: a share is expired *at* `expires_at`.
    pub fn is_expired(&self, now: UtcDateTime) -> bool {
        now >= self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        !self.access_limit.allows(self.access_count)
    }
}

/// A share together with the document it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedDocument {
    pub share: Share,
    pub document: Document,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ShareRow {
    pub(crate) id: String,
    pub(crate) document_id: String,
    pub(crate) token: String,
    pub(crate) expires_at: i64,
    pub(crate) max_access: i64,
    pub(crate) access_count: i64,
    pub(crate) password_hash: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: i64,
}
impl From<&Share> for ShareRow {
    fn from(share: &Share) -> Self {
        Self {
            id: share.id.to_string(),
            document_id: share.document_id.to_string(),
            token: share.token.clone(),
            expires_at: share.expires_at.unix_timestamp(),
            max_access: share.access_limit.as_raw(),
            access_count: i64::from(share.access_count),
            password_hash: share.password_hash.clone(),
            created_by: share.created_by.to_string(),
            created_at: share.created_at.unix_timestamp(),
        }
    }
}
impl TryFrom<ShareRow> for Share {
    type Error = Error;
    fn try_from(row: ShareRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&row.id, "share id")?,
            document_id: parse_id(&row.document_id, "shared document id")?,
            token: row.token,
            expires_at: parse_timestamp(row.expires_at, "share expiry")?,
            access_limit: AccessLimit::from_raw(row.max_access)
                .ok_or_raise(|| ErrorKind::InvalidData("share access limit"))?,
            access_count: u32::try_from(row.access_count).or_raise(|| ErrorKind::InvalidData("share access count"))?,
            password_hash: row.password_hash,
            created_by: parse_id(&row.created_by, "share creator")?,
            created_at: parse_timestamp(row.created_at, "share creation date")?,
        })
    }
}

/// Flat row for the share/document join. Column names that both tables share
/// are aliased in the query.
#[derive(sqlx::FromRow)]
pub(crate) struct SharedDocumentRow {
    share_id: String,
    token: String,
    expires_at: i64,
    max_access: i64,
    access_count: i64,
    share_password_hash: Option<String>,
    created_by: String,
    share_created_at: i64,
    document_id: String,
    owner_id: String,
    filename: String,
    storage_key: String,
    size: i64,
    mime_type: String,
    checksum: String,
    document_created_at: i64,
    document_updated_at: i64,
}
impl TryFrom<SharedDocumentRow> for SharedDocument {
    type Error = Error;
    fn try_from(row: SharedDocumentRow) -> Result<Self, Self::Error> {
        let share = ShareRow {
            id: row.share_id,
            document_id: row.document_id.clone(),
            token: row.token,
            expires_at: row.expires_at,
            max_access: row.max_access,
            access_count: row.access_count,
            password_hash: row.share_password_hash,
            created_by: row.created_by,
            created_at: row.share_created_at,
        };
        let document = DocumentRow {
            id: row.document_id,
            owner_id: row.owner_id,
            filename: row.filename,
            storage_key: row.storage_key,
            size: row.size,
            mime_type: row.mime_type,
            checksum: row.checksum,
            created_at: row.document_created_at,
            updated_at: row.document_updated_at,
        };
        Ok(Self { share: share.try_into()?, document: document.try_into()? })
    }
}
