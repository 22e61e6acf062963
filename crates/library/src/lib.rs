//! Document storage with public share links.
//!
//! - [`CachedRepository`]: cache-aside reads and write-invalidation over the
//!   relational store.
//! - [`DocumentManager`]: uploads, downloads and deletions, keeping blobs and
//!   rows in step.
//! - [`ShareGate`]: creates share links and decides who may open them.
//! - [`Accounts`]: registration, login and session tokens.
//!
//! [`Strongbox`] wires all four together over one set of handles.

pub mod accounts;
pub mod clock;
mod digest;
pub mod documents;
mod entry;
pub mod error;
pub mod keys;
pub mod repository;
mod secret;
pub mod share;
pub mod validate;

pub use crate::accounts::{Accounts, SESSION_TTL, Session, TokenServiceHandle};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::documents::{DocumentManager, NewDocument};
pub use crate::keys::CacheTtls;
pub use crate::repository::CachedRepository;
pub use crate::secret::HasherHandle;
pub use crate::share::{GrantedDocument, ShareAccess, ShareGate, ShareOptions};
use std::sync::Arc;
use strongbox_cache::Cache;
use strongbox_storage::BackendHandle;
use strongbox_store::Repository;

/// Everything a caller needs, built once at startup.
#[derive(Debug, Clone)]
pub struct Strongbox {
    pub repo: CachedRepository,
    pub documents: DocumentManager,
    pub shares: ShareGate,
    pub accounts: Accounts,
}

/// Handles [`Strongbox`] is assembled from.
pub struct Parts {
    pub store: Repository,
    pub cache: Cache,
    pub ttl: CacheTtls,
    pub blobs: BackendHandle,
    pub bucket: String,
    pub hasher: HasherHandle,
    pub tokens: TokenServiceHandle,
    pub clock: Arc<dyn Clock>,
}

impl Strongbox {
    pub fn new(parts: Parts) -> Self {
        let repo = CachedRepository::new(parts.store, parts.cache, parts.ttl, parts.clock);
        let documents = DocumentManager::new(repo.clone(), parts.blobs, parts.bucket);
        let shares = ShareGate::new(repo.clone(), documents.clone(), Arc::clone(&parts.hasher));
        let accounts = Accounts::new(repo.clone(), parts.hasher, parts.tokens);
        Self { repo, documents, shares, accounts }
    }
}
