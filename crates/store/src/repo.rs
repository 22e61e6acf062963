//! Repository for users, documents and shares.
//!
//! Every method is a single statement against the pool; nothing here caches.
//! Identifiers go in and out as [`Uuid`] but are stored as text.

use crate::Database;
use crate::error::{ErrorKind, Result, is_unique_violation};
use crate::models::{
    Document, DocumentRow, Share, ShareRow, SharedDocument, SharedDocumentRow, User, UserRow,
};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::debug;
use uuid::Uuid;

/// Map a failed insert to [`ErrorKind::Conflict`] when a unique constraint
/// rejected it, and [`ErrorKind::Database`] otherwise.
fn insert_result(result: sqlx::Result<sqlx::sqlite::SqliteQueryResult>, field: &'static str) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(err).or_raise(|| ErrorKind::Conflict(field)),
        Err(err) => Err(err).or_raise(|| ErrorKind::Database),
    }
}

/// Repository for the system of record.
///
/// # Relationships
///
/// - A user owns many documents; a document has exactly one owner.
/// - A document has many shares; deleting the document cascades to them.
/// - A share's token is globally unique and is its only public identifier.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user.
    ///
    /// Returns [`ErrorKind::Conflict`] if the email address is already taken.
    pub async fn create_user(&self, user: &User) -> Result<()> {
        let row = UserRow::from(user);
        let result = sqlx::query(include_str!("../queries/insert_user.sql"))
            .bind(row.id)
            .bind(row.email)
            .bind(row.password_hash)
            .bind(row.full_name)
            .bind(row.is_active)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await;
        insert_result(result, "email")
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(include_str!("../queries/get_user_by_id.sql"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(User::try_from).transpose()
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(include_str!("../queries/get_user_by_email.sql"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(User::try_from).transpose()
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Insert a document record. The blob must already be stored.
    pub async fn create_document(&self, document: &Document) -> Result<()> {
        let row = DocumentRow::try_from(document)?;
        let result = sqlx::query(include_str!("../queries/insert_document.sql"))
            .bind(row.id)
            .bind(row.owner_id)
            .bind(row.filename)
            .bind(row.storage_key)
            .bind(row.size)
            .bind(row.mime_type)
            .bind(row.checksum)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await;
        insert_result(result, "storage key")
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let row: Option<DocumentRow> = sqlx::query_as(include_str!("../queries/get_document.sql"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Document::try_from).transpose()
    }

    /// List an owner's documents in creation order (oldest first, ties broken
    /// by insertion order).
    pub async fn list_documents_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(include_str!("../queries/list_documents_by_owner.sql"))
            .bind(owner_id.to_string())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Document::try_from).collect()
    }

    /// Delete a document, but only if it belongs to `owner_id`. Its shares are
    /// removed by cascade.
    ///
    /// Returns `true` if a record was deleted.
    pub async fn delete_document(&self, id: Uuid, owner_id: Uuid) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_document.sql"))
            .bind(id.to_string())
            .bind(owner_id.to_string())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Tokens of every share pointing at a document.
    pub async fn list_share_tokens_for_document(&self, document_id: Uuid) -> Result<Vec<String>> {
        let tokens: Vec<String> = sqlx::query_scalar(include_str!("../queries/list_share_tokens_for_document.sql"))
            .bind(document_id.to_string())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(tokens)
    }

    // =========================================================================
    // Shares
    // =========================================================================

    /// Insert a share.
    ///
    /// Returns [`ErrorKind::Conflict`] if the token collides with an existing
    /// share; the caller should generate a new token and try again.
    pub async fn create_share(&self, share: &Share) -> Result<()> {
        let row = ShareRow::from(share);
        let result = sqlx::query(include_str!("../queries/insert_share.sql"))
            .bind(row.id)
            .bind(row.document_id)
            .bind(row.token)
            .bind(row.expires_at)
            .bind(row.max_access)
            .bind(row.access_count)
            .bind(row.password_hash)
            .bind(row.created_by)
            .bind(row.created_at)
            .execute(&self.pool)
            .await;
        insert_result(result, "share token")
    }

    pub async fn get_share_by_id(&self, id: Uuid) -> Result<Option<Share>> {
        let row: Option<ShareRow> = sqlx::query_as(include_str!("../queries/get_share_by_id.sql"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Share::try_from).transpose()
    }

    /// Look up a share and its document by public token.
    pub async fn get_share_by_token(&self, token: &str) -> Result<Option<SharedDocument>> {
        let row: Option<SharedDocumentRow> = sqlx::query_as(include_str!("../queries/get_share_by_token.sql"))
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(SharedDocument::try_from).transpose()
    }

    /// Count one access against a share, if it is still valid at `now`.
    ///
    /// The validity check and the increment are one conditional `UPDATE`, so
    /// concurrent callers can never push the count past the share's limit.
    /// Returns the new access count, or `None` if the share is missing,
    /// expired or exhausted (re-read it to find out which).
    pub async fn consume_share(&self, id: Uuid, now: UtcDateTime) -> Result<Option<u32>> {
        let count: Option<i64> = sqlx::query_scalar(include_str!("../queries/consume_share.sql"))
            .bind(id.to_string())
            .bind(now.unix_timestamp())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        debug!(share = %id, consumed = count.is_some(), "share access counted");
        count.map(|c| u32::try_from(c).or_raise(|| ErrorKind::InvalidData("share access count"))).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccessLimit;
    use rstest::{fixture, rstest};

    fn at(seconds: i64) -> UtcDateTime {
        UtcDateTime::from_unix_timestamp(1_700_000_000 + seconds).unwrap()
    }

    #[fixture]
    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        Repository::from(&db)
    }

    async fn seed_user(repo: &Repository, email: &str) -> User {
        let user = User::new(email, "$argon2id$v=19$stub", "Test User", at(0));
        repo.create_user(&user).await.unwrap();
        user
    }

    async fn seed_document(repo: &Repository, owner: &User, name: &str, created: i64) -> Document {
        let id = Uuid::new_v4();
        let document = Document {
            id,
            owner_id: owner.id,
            filename: name.to_string(),
            storage_key: format!("{}/{id}.pdf", owner.id),
            size: 42,
            mime_type: "application/pdf".to_string(),
            checksum: "ab".repeat(32),
            created_at: at(created),
            updated_at: at(created),
        };
        repo.create_document(&document).await.unwrap();
        document
    }

    fn share_for(document: &Document, token: &str, expires_in: i64, limit: AccessLimit) -> Share {
        Share {
            id: Uuid::new_v4(),
            document_id: document.id,
            token: token.to_string(),
            expires_at: at(expires_in),
            access_limit: limit,
            access_count: 0,
            password_hash: None,
            created_by: document.owner_id,
            created_at: at(0),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_user_roundtrip(#[future] repo: Repository) {
        let repo = repo.await;
        let user = seed_user(&repo, "ada@example.com").await;
        assert_eq!(repo.get_user_by_id(user.id).await.unwrap(), Some(user.clone()));
        assert_eq!(repo.get_user_by_email("ada@example.com").await.unwrap(), Some(user));
        assert_eq!(repo.get_user_by_email("nobody@example.com").await.unwrap(), None);
        assert_eq!(repo.get_user_by_id(Uuid::new_v4()).await.unwrap(), None);
    }

    #[rstest]
    #[tokio::test]
    async fn test_duplicate_email_conflicts(#[future] repo: Repository) {
        let repo = repo.await;
        seed_user(&repo, "ada@example.com").await;
        let duplicate = User::new("ada@example.com", "x", "Other", at(1));
        let err = repo.create_user(&duplicate).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conflict("email")));
    }

    #[rstest]
    #[tokio::test]
    async fn test_documents_listed_in_creation_order(#[future] repo: Repository) {
        let repo = repo.await;
        let owner = seed_user(&repo, "ada@example.com").await;
        let other = seed_user(&repo, "bob@example.com").await;
        let second = seed_document(&repo, &owner, "b.pdf", 10).await;
        let first = seed_document(&repo, &owner, "a.pdf", 5).await;
        // Same timestamp as `second`: insertion order breaks the tie.
        let third = seed_document(&repo, &owner, "c.pdf", 10).await;
        seed_document(&repo, &other, "x.pdf", 1).await;

        let listed = repo.list_documents_by_owner(owner.id).await.unwrap();
        let ids = listed.iter().map(|d| d.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
        assert!(repo.list_documents_by_owner(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_document_requires_existing_owner(#[future] repo: Repository) {
        let repo = repo.await;
        let ghost = User::new("ghost@example.com", "x", "Ghost", at(0));
        let document = Document {
            id: Uuid::new_v4(),
            owner_id: ghost.id,
            filename: "a.pdf".to_string(),
            storage_key: "k".to_string(),
            size: 1,
            mime_type: "application/pdf".to_string(),
            checksum: String::new(),
            created_at: at(0),
            updated_at: at(0),
        };
        let err = repo.create_document(&document).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Database));
    }

    #[rstest]
    #[tokio::test]
    async fn test_delete_document_is_owner_scoped_and_cascades(#[future] repo: Repository) {
        let repo = repo.await;
        let owner = seed_user(&repo, "ada@example.com").await;
        let intruder = seed_user(&repo, "eve@example.com").await;
        let document = seed_document(&repo, &owner, "a.pdf", 0).await;
        repo.create_share(&share_for(&document, "tok-1", 3600, AccessLimit::Unlimited)).await.unwrap();
        repo.create_share(&share_for(&document, "tok-2", 3600, AccessLimit::Limited(3))).await.unwrap();
        assert_eq!(repo.list_share_tokens_for_document(document.id).await.unwrap(), vec!["tok-1", "tok-2"]);

        assert!(!repo.delete_document(document.id, intruder.id).await.unwrap());
        assert!(repo.get_document(document.id).await.unwrap().is_some());

        assert!(repo.delete_document(document.id, owner.id).await.unwrap());
        assert_eq!(repo.get_document(document.id).await.unwrap(), None);
        assert_eq!(repo.get_share_by_token("tok-1").await.unwrap(), None);
        assert!(repo.list_share_tokens_for_document(document.id).await.unwrap().is_empty());
        // Already gone
        assert!(!repo.delete_document(document.id, owner.id).await.unwrap());
    }

    #[rstest]
    #[tokio::test]
    async fn test_share_lookup_joins_document(#[future] repo: Repository) {
        let repo = repo.await;
        let owner = seed_user(&repo, "ada@example.com").await;
        let document = seed_document(&repo, &owner, "a.pdf", 0).await;
        let mut share = share_for(&document, "tok", 3600, AccessLimit::Limited(2));
        share.password_hash = Some("$argon2id$stub".to_string());
        repo.create_share(&share).await.unwrap();

        let found = repo.get_share_by_token("tok").await.unwrap().unwrap();
        assert_eq!(found.share, share);
        assert_eq!(found.document, document);
        assert_eq!(repo.get_share_by_id(share.id).await.unwrap(), Some(share));
        assert_eq!(repo.get_share_by_token("missing").await.unwrap(), None);
    }

    #[rstest]
    #[tokio::test]
    async fn test_duplicate_token_conflicts(#[future] repo: Repository) {
        let repo = repo.await;
        let owner = seed_user(&repo, "ada@example.com").await;
        let document = seed_document(&repo, &owner, "a.pdf", 0).await;
        repo.create_share(&share_for(&document, "tok", 3600, AccessLimit::Unlimited)).await.unwrap();
        let err = repo.create_share(&share_for(&document, "tok", 60, AccessLimit::Unlimited)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conflict("share token")));
    }

    #[rstest]
    #[tokio::test]
    async fn test_consume_share_respects_limit(#[future] repo: Repository) {
        let repo = repo.await;
        let owner = seed_user(&repo, "ada@example.com").await;
        let document = seed_document(&repo, &owner, "a.pdf", 0).await;
        let share = share_for(&document, "tok", 3600, AccessLimit::Limited(2));
        repo.create_share(&share).await.unwrap();

        assert_eq!(repo.consume_share(share.id, at(1)).await.unwrap(), Some(1));
        assert_eq!(repo.consume_share(share.id, at(2)).await.unwrap(), Some(2));
        assert_eq!(repo.consume_share(share.id, at(3)).await.unwrap(), None);
        let stored = repo.get_share_by_id(share.id).await.unwrap().unwrap();
        assert_eq!(stored.access_count, 2);
        assert!(stored.is_exhausted());
    }

    #[rstest]
    #[case::one_second_before(3599, Some(1))]
    #[case::at_expiry(3600, None)]
    #[case::after_expiry(7200, None)]
    #[tokio::test]
    async fn test_consume_share_expiry_boundary(
        #[future] repo: Repository,
        #[case] now: i64,
        #[case] expected: Option<u32>,
    ) {
        let repo = repo.await;
        let owner = seed_user(&repo, "ada@example.com").await;
        let document = seed_document(&repo, &owner, "a.pdf", 0).await;
        let share = share_for(&document, "tok", 3600, AccessLimit::Unlimited);
        repo.create_share(&share).await.unwrap();
        assert_eq!(repo.consume_share(share.id, at(now)).await.unwrap(), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn test_consume_missing_share(#[future] repo: Repository) {
        let repo = repo.await;
        assert_eq!(repo.consume_share(Uuid::new_v4(), at(0)).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_consume_share_concurrently_never_exceeds_limit() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("store.db")).await.unwrap();
        let repo = Repository::from(&db);
        let owner = seed_user(&repo, "ada@example.com").await;
        let document = seed_document(&repo, &owner, "a.pdf", 0).await;
        let share = share_for(&document, "tok", 3600, AccessLimit::Limited(5));
        repo.create_share(&share).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..25 {
            let repo = repo.clone();
            let id = share.id;
            tasks.spawn(async move { repo.consume_share(id, at(i)).await.unwrap() });
        }
        let granted = tasks.join_all().await.into_iter().flatten().count();
        assert_eq!(granted, 5);
        let stored = repo.get_share_by_id(share.id).await.unwrap().unwrap();
        assert_eq!(stored.access_count, 5);
        db.close().await;
    }
}
