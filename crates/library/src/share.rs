//! Public share links.
//!
//! Opening a share walks a fixed sequence of checks, and the first one that
//! fails decides the outcome: lookup, expiry, access limit, password. Only a
//! request that passes all of them reaches the store's conditional
//! increment, which re-checks expiry and the limit atomically. The cached
//! share is only used to fail early; it can never grant access on its own.

use crate::documents::DocumentManager;
use crate::error::{ErrorKind, Result};
use crate::repository::CachedRepository;
use crate::secret::{self, HasherHandle};
use crate::validate;
use strongbox_auth::generate_share_token;
use strongbox_storage::BlobReader;
use strongbox_store::{Share, SharedDocument};
use time::UtcDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Attempts at drawing a token that is not already in use.
const TOKEN_ATTEMPTS: usize = 3;

/// Outcome of opening a share.
#[derive(Debug)]
pub enum ShareAccess {
    Granted(GrantedDocument),
    NotFound,
    Expired,
    Exhausted,
    PasswordRequired,
    PasswordRejected,
}

/// A shared document, open for reading.
pub struct GrantedDocument {
    pub stream: BlobReader,
    pub mime_type: String,
    pub filename: String,
    pub size: u64,
    /// Accesses counted so far, including this one.
    pub access_count: u32,
}

impl std::fmt::Debug for GrantedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantedDocument")
            .field("mime_type", &self.mime_type)
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("access_count", &self.access_count)
            .finish_non_exhaustive()
    }
}

/// Requested share settings; `None` picks the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareOptions {
    pub days: Option<i64>,
    pub hours: Option<i64>,
    /// `-1` for unlimited.
    pub max_access: Option<i64>,
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct ShareGate {
    repo: CachedRepository,
    documents: DocumentManager,
    hasher: HasherHandle,
}

impl std::fmt::Debug for ShareGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareGate").field("documents", &self.documents).finish_non_exhaustive()
    }
}

impl ShareGate {
    pub fn new(repo: CachedRepository, documents: DocumentManager, hasher: HasherHandle) -> Self {
        Self { repo, documents, hasher }
    }

    /// Create a share link for one of `owner_id`'s documents.
    #[instrument(skip_all, fields(owner = %owner_id, document = %document_id))]
    pub async fn create_share(&self, owner_id: Uuid, document_id: Uuid, options: ShareOptions) -> Result<Share> {
        let lifetime = validate::share_lifetime(options.days, options.hours)?;
        let access_limit = validate::share_max_access(options.max_access.unwrap_or(-1))?;
        let password = options.password.filter(|p| !p.is_empty());
        if let Some(password) = &password {
            validate::share_password(password)?;
        }

        let document = self.repo.get_document_uncached(document_id).await?;
        if document.owner_id != owner_id {
            exn::bail!(ErrorKind::Unauthorized);
        }
        let password_hash = match &password {
            Some(password) => Some(secret::hash(&self.hasher, password).await?),
            None => None,
        };

        let now = self.repo.now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let share = Share {
                id: Uuid::new_v4(),
                document_id: document.id,
                token: generate_share_token(),
                expires_at: now + lifetime,
                access_limit,
                access_count: 0,
                password_hash: password_hash.clone(),
                created_by: owner_id,
                created_at: now,
            };
            match self.repo.create_share(&share).await {
                Ok(()) => {
                    info!(share = %share.id, expires_at = %share.expires_at, "share created");
                    return Ok(share);
                },
                Err(err) if *err == ErrorKind::Conflict && attempt < TOKEN_ATTEMPTS => {
                    warn!(attempt, "share token collision, drawing another");
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Open the document behind `token`.
    ///
    /// Every refusal is an outcome, not an error; errors are reserved for
    /// infrastructure failures.
    #[instrument(skip_all)]
    pub async fn access_share(&self, token: &str, password: Option<&str>) -> Result<ShareAccess> {
        let SharedDocument { share, document } = match self.repo.get_share_by_token(token).await {
            Ok(shared) => shared,
            Err(err) if *err == ErrorKind::NotFound => return Ok(ShareAccess::NotFound),
            Err(err) => return Err(err),
        };

        let now = self.repo.now();
        if share.is_expired(now) {
            return Ok(ShareAccess::Expired);
        }
        if share.is_exhausted() {
            return Ok(ShareAccess::Exhausted);
        }
        if let Some(digest) = &share.password_hash {
            let Some(password) = password.filter(|p| !p.is_empty()) else {
                return Ok(ShareAccess::PasswordRequired);
            };
            if !secret::verify(&self.hasher, digest, password).await? {
                debug!(share = %share.id, "wrong share password");
                return Ok(ShareAccess::PasswordRejected);
            }
        }

        let Some(access_count) = self.repo.consume_share(share.id, token, now).await? else {
            return self.refused(&share, token, now).await;
        };
        // The access is already counted; a blob that has gone missing still
        // uses it up, but reads as a dead link rather than a failure.
        let stream = match self.documents.open(&document).await {
            Ok(stream) => stream,
            Err(err) if *err == ErrorKind::NotFound => {
                warn!(share = %share.id, key = %document.storage_key, "shared blob is missing");
                return Ok(ShareAccess::NotFound);
            },
            Err(err) => return Err(err),
        };
        info!(share = %share.id, document = %document.id, access_count, "share accessed");
        Ok(ShareAccess::Granted(GrantedDocument {
            stream,
            mime_type: document.mime_type,
            filename: document.filename,
            size: document.size,
            access_count,
        }))
    }

    /// Explain why the store refused an increment the cached share allowed.
    async fn refused(&self, cached: &Share, token: &str, now: UtcDateTime) -> Result<ShareAccess> {
        self.repo.invalidate_share(token).await;
        let share = match self.repo.get_share_uncached(cached.id).await {
            Ok(share) => share,
            Err(err) if *err == ErrorKind::NotFound => return Ok(ShareAccess::NotFound),
            Err(err) => return Err(err),
        };
        debug!(share = %share.id, access_count = share.access_count, "stale share in cache");
        match share.is_expired(now) {
            true => Ok(ShareAccess::Expired),
            false => Ok(ShareAccess::Exhausted),
        }
    }
}
