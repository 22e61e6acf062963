//! Flat, serializable forms of store records, as written to the cache.
//!
//! Timestamps are Unix seconds. Converting back into a model can fail (for
//! example a malformed entry written by an older build); callers treat that
//! the same as a cache miss.

use serde::{Deserialize, Serialize};
use strongbox_store::{AccessLimit, Document, Share, SharedDocument, User};
use time::UtcDateTime;
use uuid::Uuid;

fn timestamp(seconds: i64) -> Option<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(seconds).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CachedUser {
    id: Uuid,
    email: String,
    password_hash: String,
    full_name: String,
    is_active: bool,
    created_at: i64,
    updated_at: i64,
}
impl From<&User> for CachedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            full_name: user.full_name.clone(),
            is_active: user.is_active,
            created_at: user.created_at.unix_timestamp(),
            updated_at: user.updated_at.unix_timestamp(),
        }
    }
}
impl CachedUser {
    pub(crate) fn into_model(self) -> Option<User> {
        Some(User {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            full_name: self.full_name,
            is_active: self.is_active,
            created_at: timestamp(self.created_at)?,
            updated_at: timestamp(self.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CachedDocument {
    id: Uuid,
    owner_id: Uuid,
    filename: String,
    storage_key: String,
    size: u64,
    mime_type: String,
    checksum: String,
    created_at: i64,
    updated_at: i64,
}
impl From<&Document> for CachedDocument {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id,
            owner_id: document.owner_id,
            filename: document.filename.clone(),
            storage_key: document.storage_key.clone(),
            size: document.size,
            mime_type: document.mime_type.clone(),
            checksum: document.checksum.clone(),
            created_at: document.created_at.unix_timestamp(),
            updated_at: document.updated_at.unix_timestamp(),
        }
    }
}
impl CachedDocument {
    pub(crate) fn into_model(self) -> Option<Document> {
        Some(Document {
            id: self.id,
            owner_id: self.owner_id,
            filename: self.filename,
            storage_key: self.storage_key,
            size: self.size,
            mime_type: self.mime_type,
            checksum: self.checksum,
            created_at: timestamp(self.created_at)?,
            updated_at: timestamp(self.updated_at)?,
        })
    }
}

/// A share with the document fields needed to serve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CachedShare {
    id: Uuid,
    token: String,
    expires_at: i64,
    /// -1 for unlimited.
    max_access: i64,
    access_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password_hash: Option<String>,
    created_by: Uuid,
    created_at: i64,
    document: CachedDocument,
}
impl From<&SharedDocument> for CachedShare {
    fn from(shared: &SharedDocument) -> Self {
        let share = &shared.share;
        Self {
            id: share.id,
            token: share.token.clone(),
            expires_at: share.expires_at.unix_timestamp(),
            max_access: share.access_limit.as_raw(),
            access_count: share.access_count,
            password_hash: share.password_hash.clone(),
            created_by: share.created_by,
            created_at: share.created_at.unix_timestamp(),
            document: CachedDocument::from(&shared.document),
        }
    }
}
impl CachedShare {
    pub(crate) fn into_model(self) -> Option<SharedDocument> {
        let document = self.document.into_model()?;
        let share = Share {
            id: self.id,
            document_id: document.id,
            token: self.token,
            expires_at: timestamp(self.expires_at)?,
            access_limit: AccessLimit::from_raw(self.max_access)?,
            access_count: self.access_count,
            password_hash: self.password_hash,
            created_by: self.created_by,
            created_at: timestamp(self.created_at)?,
        };
        Some(SharedDocument { share, document })
    }
}

/// An owner's document list, stamped with when it was read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DocumentListSnapshot {
    documents: Vec<CachedDocument>,
    cached_at: i64,
}
impl DocumentListSnapshot {
    pub(crate) fn new(documents: &[Document], now: UtcDateTime) -> Self {
        Self { documents: documents.iter().map(CachedDocument::from).collect(), cached_at: now.unix_timestamp() }
    }

    /// Documents in the snapshot, if it is younger than `max_age` at `now`.
    ///
    /// A snapshot stamped after `now` was written by a writer with a skewed
    /// clock; its age is unknown, so it is treated as stale.
    pub(crate) fn into_fresh(self, now: UtcDateTime, max_age: std::time::Duration) -> Option<Vec<Document>> {
        let age = now.unix_timestamp().saturating_sub(self.cached_at);
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        if !(0..max_age).contains(&age) {
            return None;
        }
        self.documents.into_iter().map(CachedDocument::into_model).collect()
    }
}
