//! Connection pool for the system of record.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Readers scale with connections; writes are serialized by SQLite.
const POOL_SIZE: u32 = 5;
/// How long a writer waits for the WAL lock. Concurrent share accesses all
/// queue on the access-count `UPDATE`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection settings that `SqliteConnectOptions` has no setter for.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA wal_autocheckpoint = 800;
    PRAGMA temp_store = MEMORY;
    PRAGMA cache_size = -8192;
";

/// Handle to the users/documents/shares database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file at `path` and bring its schema up
    /// to date. Missing parent directories are created.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
        }
        Self::open(options().filename(path).create_if_missing(true), POOL_SIZE).await
    }

    /// A private in-memory database, for tests in this and dependent crates.
    ///
    /// Limited to one connection: every new `:memory:` connection would be a
    /// separate, empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::open(options().filename(":memory:"), 1).await
    }

    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .after_connect(|conn, meta| Box::pin(configure(conn, meta)))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    #[instrument(skip_all)]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)?;
        debug!("schema up to date");
        Ok(())
    }

    /// Round-trip a trivial query, for health checks.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query(include_str!("../queries/ping.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Drain and close the pool. The handle (and its clones) must not be used
    /// afterwards.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

fn options() -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        // Documents and shares cascade from their owners.
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
}

async fn configure(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
    sqlx::query(CONNECTION_PRAGMAS).execute(conn).await?;
    Ok(())
}
