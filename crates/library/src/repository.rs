//! Cache-aside access to users, documents and shares.
//!
//! Reads go to the cache first and fall back to the store, populating the
//! cache on the way out. Writes go to the store and then remove (never
//! update) every cache entry the write could have made stale. The cache is
//! best-effort: a failed cache call is logged and treated as a miss, so a
//! cache outage only ever costs latency.

use crate::clock::Clock;
use crate::entry::{CachedDocument, CachedShare, CachedUser, DocumentListSnapshot};
use crate::error::{ErrorKind, Result};
use crate::keys::{self, CacheTtls};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use strongbox_cache::Cache;
use strongbox_store::{Document, Repository, Share, SharedDocument, User};
use time::UtcDateTime;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct CachedRepository {
    store: Repository,
    cache: Cache,
    ttl: CacheTtls,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CachedRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRepository").field("cache", &self.cache).field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl CachedRepository {
    pub fn new(store: Repository, cache: Cache, ttl: CacheTtls, clock: Arc<dyn Clock>) -> Self {
        Self { store, cache, ttl, clock }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn now(&self) -> UtcDateTime {
        self.clock.now()
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get_json(key).await {
            Ok(hit) => {
                debug!(key, hit = hit.is_some(), "cache lookup");
                hit
            },
            Err(err) => {
                warn!(key, error = ?err, "cache read failed, falling back to store");
                None
            },
        }
    }

    async fn populate<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(err) = self.cache.set_json(key, value, ttl).await {
            warn!(key, error = ?err, "cache write failed");
        }
    }

    async fn forget(&self, key: &str) {
        if let Err(err) = self.cache.delete(key).await {
            warn!(key, error = ?err, "cache invalidation failed");
        }
    }

    // Users

    #[instrument(skip(self))]
    pub async fn get_user_by_id(&self, id: Uuid) -> Result<User> {
        let key = keys::user_by_id(id);
        if let Some(user) = self.cached::<CachedUser>(&key).await.and_then(CachedUser::into_model) {
            return Ok(user);
        }
        let user = self.store.get_user_by_id(id).await.map_err(ErrorKind::store)?;
        let user = user.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound))?;
        self.populate(&key, &CachedUser::from(&user), self.ttl.user_by_id).await;
        Ok(user)
    }

    /// `email` must already be normalized.
    #[instrument(skip(self))]
    pub async fn get_user_by_email(&self, email: &str) -> Result<User> {
        let key = keys::user_by_email(email);
        if let Some(user) = self.cached::<CachedUser>(&key).await.and_then(CachedUser::into_model) {
            return Ok(user);
        }
        let user = self.store.get_user_by_email(email).await.map_err(ErrorKind::store)?;
        let user = user.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound))?;
        self.populate(&key, &CachedUser::from(&user), self.ttl.user_by_email).await;
        Ok(user)
    }

    /// Fails with [`ErrorKind::Conflict`] when the email is taken.
    #[instrument(skip_all, fields(user = %user.id))]
    pub async fn create_user(&self, user: &User) -> Result<()> {
        self.store.create_user(user).await.map_err(ErrorKind::store)?;
        self.invalidate_user(user).await;
        Ok(())
    }

    pub async fn invalidate_user(&self, user: &User) {
        self.forget(&keys::user_by_id(user.id)).await;
        self.forget(&keys::user_by_email(&user.email)).await;
    }

    // Documents

    #[instrument(skip(self))]
    pub async fn get_document_by_id(&self, id: Uuid) -> Result<Document> {
        let key = keys::document(id);
        if let Some(document) = self.cached::<CachedDocument>(&key).await.and_then(CachedDocument::into_model) {
            return Ok(document);
        }
        let document = self.get_document_uncached(id).await?;
        self.populate(&key, &CachedDocument::from(&document), self.ttl.document).await;
        Ok(document)
    }

    /// Read a document straight from the store, for decisions that must not
    /// act on a stale copy.
    pub async fn get_document_uncached(&self, id: Uuid) -> Result<Document> {
        let document = self.store.get_document(id).await.map_err(ErrorKind::store)?;
        document.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound))
    }

    /// An owner's documents, oldest first.
    ///
    /// A cached snapshot is only used while it is younger than the list TTL
    /// by this repository's clock, whatever the cache itself says.
    #[instrument(skip(self))]
    pub async fn list_documents_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>> {
        let key = keys::owner_documents(owner_id);
        let now = self.clock.now();
        if let Some(snapshot) = self.cached::<DocumentListSnapshot>(&key).await {
            match snapshot.into_fresh(now, self.ttl.document_list) {
                Some(documents) => return Ok(documents),
                None => debug!(key, "stale document list snapshot"),
            }
        }
        let documents = self.store.list_documents_by_owner(owner_id).await.map_err(ErrorKind::store)?;
        self.populate(&key, &DocumentListSnapshot::new(&documents, now), self.ttl.document_list).await;
        Ok(documents)
    }

    #[instrument(skip_all, fields(document = %document.id, owner = %document.owner_id))]
    pub async fn create_document(&self, document: &Document) -> Result<()> {
        self.store.create_document(document).await.map_err(ErrorKind::store)?;
        self.forget(&keys::document(document.id)).await;
        self.forget(&keys::owner_documents(document.owner_id)).await;
        Ok(())
    }

    /// Delete `document`'s row, scoped to its owner, and forget it along
    /// with the given share tokens.
    ///
    /// Returns `false` if no row matched (already deleted, or the owner
    /// changed).
    #[instrument(skip_all, fields(document = %document.id, owner = %document.owner_id))]
    pub async fn delete_document(&self, document: &Document, share_tokens: &[String]) -> Result<bool> {
        let deleted =
            self.store.delete_document(document.id, document.owner_id).await.map_err(ErrorKind::store)?;
        self.forget(&keys::document(document.id)).await;
        self.forget(&keys::owner_documents(document.owner_id)).await;
        for token in share_tokens {
            self.forget(&keys::share(token)).await;
        }
        Ok(deleted)
    }

    pub async fn list_share_tokens(&self, document_id: Uuid) -> Result<Vec<String>> {
        self.store.list_share_tokens_for_document(document_id).await.map_err(ErrorKind::store)
    }

    // Shares

    /// Fails with [`ErrorKind::Conflict`] when the token is already in use.
    #[instrument(skip_all, fields(share = %share.id, document = %share.document_id))]
    pub async fn create_share(&self, share: &Share) -> Result<()> {
        self.store.create_share(share).await.map_err(ErrorKind::store)?;
        self.invalidate_share(&share.token).await;
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn get_share_by_token(&self, token: &str) -> Result<SharedDocument> {
        let key = keys::share(token);
        if let Some(shared) = self.cached::<CachedShare>(&key).await.and_then(CachedShare::into_model) {
            return Ok(shared);
        }
        let shared = self.store.get_share_by_token(token).await.map_err(ErrorKind::store)?;
        let shared = shared.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound))?;
        self.populate(&key, &CachedShare::from(&shared), self.ttl.share).await;
        Ok(shared)
    }

    /// Read a share straight from the store.
    pub async fn get_share_uncached(&self, id: Uuid) -> Result<Share> {
        let share = self.store.get_share_by_id(id).await.map_err(ErrorKind::store)?;
        share.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound))
    }

    /// Count one access against a share if it is still open at `now`, and
    /// forget its cached copy.
    ///
    /// Returns the new access count, or `None` when the store refused the
    /// increment.
    #[instrument(skip(self, token))]
    pub async fn consume_share(&self, id: Uuid, token: &str, now: UtcDateTime) -> Result<Option<u32>> {
        let count = self.store.consume_share(id, now).await.map_err(ErrorKind::store)?;
        if count.is_some() {
            self.invalidate_share(token).await;
        }
        Ok(count)
    }

    pub async fn invalidate_share(&self, token: &str) {
        self.forget(&keys::share(token)).await;
    }

    /// Drop every cached share.
    ///
    /// Unlike single-key invalidation this reports cache failures, since a
    /// partial sweep leaves an unknown set of stale entries behind.
    pub async fn invalidate_all_shares(&self) -> Result<u64> {
        let removed = self.cache.delete_pattern(keys::ALL_SHARES).await.or_raise(|| ErrorKind::Cache)?;
        debug!(removed, "share cache cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::ops::Deref;
    use strongbox_cache::{CacheBackend, MemoryBackend};
    use strongbox_store::{AccessLimit, Database};

    struct Fixture {
        repo: CachedRepository,
        store: Repository,
        backend: Arc<MemoryBackend>,
        clock: Arc<ManualClock>,
    }

    impl Deref for Fixture {
        type Target = CachedRepository;
        fn deref(&self) -> &Self::Target {
            &self.repo
        }
    }

    fn at(seconds: i64) -> UtcDateTime {
        UtcDateTime::from_unix_timestamp(1_700_000_000 + seconds).unwrap()
    }

    async fn fixture() -> Fixture {
        let db = Database::connect_in_memory().await.unwrap();
        let store = Repository::from(&db);
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(ManualClock::new(at(0)));
        let cache = Cache::from_backend(backend.clone());
        let repo = CachedRepository::new(store.clone(), cache, CacheTtls::default(), clock.clone());
        Fixture { repo, store, backend, clock }
    }

    async fn seed_user(repo: &CachedRepository, email: &str) -> User {
        let user = User::new(email, "$argon2id$v=19$stub", "Test User", at(0));
        repo.create_user(&user).await.unwrap();
        user
    }

    async fn seed_document(repo: &CachedRepository, owner: &User, name: &str) -> Document {
        let id = Uuid::new_v4();
        let document = Document {
            id,
            owner_id: owner.id,
            filename: name.to_string(),
            storage_key: format!("{}/{id}.pdf", owner.id),
            size: 3,
            mime_type: "application/pdf".to_string(),
            checksum: "00".repeat(32),
            created_at: repo.now(),
            updated_at: repo.now(),
        };
        repo.create_document(&document).await.unwrap();
        document
    }

    async fn seed_share(repo: &CachedRepository, document: &Document, limit: AccessLimit) -> Share {
        let share = Share {
            id: Uuid::new_v4(),
            document_id: document.id,
            token: format!("token-{}", Uuid::new_v4().simple()),
            expires_at: repo.now() + time::Duration::hours(1),
            access_limit: limit,
            access_count: 0,
            password_hash: None,
            created_by: document.owner_id,
            created_at: repo.now(),
        };
        repo.create_share(&share).await.unwrap();
        share
    }

    #[tokio::test]
    async fn test_user_read_through_populates_both_keys() {
        let f = fixture().await;
        let user = seed_user(&f, "ada@example.com").await;
        assert!(!f.backend.exists(&keys::user_by_id(user.id)).await.unwrap());

        assert_eq!(f.get_user_by_id(user.id).await.unwrap(), user);
        assert_eq!(f.get_user_by_email("ada@example.com").await.unwrap(), user);
        assert!(f.backend.exists(&keys::user_by_id(user.id)).await.unwrap());
        assert!(f.backend.exists(&keys::user_by_email("ada@example.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_not_found_is_never_cached() {
        let f = fixture().await;
        let err = f.get_user_by_email("nobody@example.com").await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound);
        assert!(!f.backend.exists(&keys::user_by_email("nobody@example.com")).await.unwrap());

        let err = f.get_document_by_id(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound);
        assert!(f.backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_hit_served_without_store() {
        let f = fixture().await;
        let user = seed_user(&f, "ada@example.com").await;
        let document = seed_document(&f, &user, "a.pdf").await;
        f.get_document_by_id(document.id).await.unwrap();

        // Remove the row behind the cache's back: the cached copy still answers.
        assert!(f.store.delete_document(document.id, user.id).await.unwrap());
        assert_eq!(f.get_document_by_id(document.id).await.unwrap(), document);
        assert_eq!(*f.get_document_uncached(document.id).await.unwrap_err(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let f = fixture().await;
        seed_user(&f, "ada@example.com").await;
        let twin = User::new("ada@example.com", "digest", "Other Ada", at(0));
        assert_eq!(*f.create_user(&twin).await.unwrap_err(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_create_document_invalidates_owner_list() {
        let f = fixture().await;
        let user = seed_user(&f, "ada@example.com").await;
        let first = seed_document(&f, &user, "a.pdf").await;
        assert_eq!(f.list_documents_by_owner(user.id).await.unwrap(), vec![first.clone()]);
        assert!(f.backend.exists(&keys::owner_documents(user.id)).await.unwrap());

        let second = seed_document(&f, &user, "b.pdf").await;
        assert!(!f.backend.exists(&keys::owner_documents(user.id)).await.unwrap());
        assert_eq!(f.list_documents_by_owner(user.id).await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_list_snapshot_expires_by_clock() {
        let f = fixture().await;
        let user = seed_user(&f, "ada@example.com").await;
        let document = seed_document(&f, &user, "a.pdf").await;
        assert_eq!(f.list_documents_by_owner(user.id).await.unwrap().len(), 1);

        // Mutate the store directly; the snapshot masks it until it ages out.
        f.store.delete_document(document.id, user.id).await.unwrap();
        f.clock.advance(time::Duration::minutes(4));
        assert_eq!(f.list_documents_by_owner(user.id).await.unwrap().len(), 1);
        f.clock.advance(time::Duration::minutes(1));
        assert!(f.list_documents_by_owner(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let f = fixture().await;
        let user = seed_user(&f, "ada@example.com").await;
        f.backend.set(&keys::user_by_id(user.id), "{broken".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(f.get_user_by_id(user.id).await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_delete_document_forgets_share_tokens() {
        let f = fixture().await;
        let user = seed_user(&f, "ada@example.com").await;
        let document = seed_document(&f, &user, "a.pdf").await;
        let share = seed_share(&f, &document, AccessLimit::Unlimited).await;
        f.get_document_by_id(document.id).await.unwrap();
        f.get_share_by_token(&share.token).await.unwrap();
        f.list_documents_by_owner(user.id).await.unwrap();

        let tokens = f.list_share_tokens(document.id).await.unwrap();
        assert_eq!(tokens, vec![share.token.clone()]);
        assert!(f.delete_document(&document, &tokens).await.unwrap());
        assert!(f.backend.is_empty().await);
        assert_eq!(*f.get_share_by_token(&share.token).await.unwrap_err(), ErrorKind::NotFound);
        assert!(!f.delete_document(&document, &tokens).await.unwrap());
    }

    #[tokio::test]
    async fn test_consume_share_invalidates_token() {
        let f = fixture().await;
        let user = seed_user(&f, "ada@example.com").await;
        let document = seed_document(&f, &user, "a.pdf").await;
        let share = seed_share(&f, &document, AccessLimit::Limited(1)).await;
        assert_eq!(f.get_share_by_token(&share.token).await.unwrap().share.access_count, 0);

        assert_eq!(f.consume_share(share.id, &share.token, f.now()).await.unwrap(), Some(1));
        assert!(!f.backend.exists(&keys::share(&share.token)).await.unwrap());
        assert_eq!(f.get_share_by_token(&share.token).await.unwrap().share.access_count, 1);
        assert_eq!(f.consume_share(share.id, &share.token, f.now()).await.unwrap(), None);
        assert_eq!(f.get_share_uncached(share.id).await.unwrap().access_count, 1);
    }

    #[tokio::test]
    async fn test_invalidate_all_shares() {
        let f = fixture().await;
        let user = seed_user(&f, "ada@example.com").await;
        let document = seed_document(&f, &user, "a.pdf").await;
        for _ in 0..3 {
            let share = seed_share(&f, &document, AccessLimit::Unlimited).await;
            f.get_share_by_token(&share.token).await.unwrap();
        }
        f.get_document_by_id(document.id).await.unwrap();
        assert_eq!(f.invalidate_all_shares().await.unwrap(), 3);
        assert!(f.backend.exists(&keys::document(document.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_cache_reads_store() {
        let db = Database::connect_in_memory().await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(at(0)));
        let repo = CachedRepository::new(Repository::from(&db), Cache::Disabled, CacheTtls::default(), clock);
        let user = seed_user(&repo, "ada@example.com").await;
        assert_eq!(repo.get_user_by_id(user.id).await.unwrap(), user);
        assert_eq!(repo.invalidate_all_shares().await.unwrap(), 0);
    }
}
