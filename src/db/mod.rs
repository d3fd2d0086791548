mod filter;
mod migrations;
mod models;
mod posts;
mod sessions;
mod tags;
mod topics;
mod users;
mod votes;

pub use filter::{Column, Filter, FilterValue, Op};
pub use models::*;
pub use posts::{PostColumn, PostRepo};
pub use sessions::*;
pub use tags::{TagColumn, TagRepo};
pub use topics::{TopicColumn, TopicRepo};
pub use users::{UserColumn, UserRepo};
pub use votes::{VoteColumn, VoteLedger};

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection, running migrations if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub async fn new(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Concurrent writers otherwise fail immediately with SQLITE_BUSY.
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all pending migrations.
    async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin an ambient transaction. Pass `Some(&mut *tx)` to repository
    /// calls that must commit or roll back together; dropping the
    /// transaction without committing rolls every statement back.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Borrow the caller's transaction, or check a connection out of the
    /// pool for the duration of one repository call.
    pub(crate) async fn acquire<'c>(
        &self,
        tx: Option<&'c mut SqliteConnection>,
    ) -> Result<Handle<'c>, sqlx::Error> {
        match tx {
            Some(conn) => Ok(Handle::Ambient(conn)),
            None => Ok(Handle::Pooled(self.pool.acquire().await?)),
        }
    }

    #[must_use]
    pub const fn topics(&self) -> TopicRepo<'_> {
        TopicRepo::new(self)
    }

    #[must_use]
    pub const fn tags(&self) -> TagRepo<'_> {
        TagRepo::new(self)
    }

    #[must_use]
    pub const fn posts(&self) -> PostRepo<'_> {
        PostRepo::new(self)
    }

    #[must_use]
    pub const fn users(&self) -> UserRepo<'_> {
        UserRepo::new(self)
    }

    #[must_use]
    pub const fn votes(&self) -> VoteLedger<'_> {
        VoteLedger::new(self)
    }
}

/// Connection a repository call runs on.
pub(crate) enum Handle<'c> {
    /// Statements join the caller's transaction.
    Ambient(&'c mut SqliteConnection),
    /// Each statement is its own implicit transaction.
    Pooled(PoolConnection<Sqlite>),
}

impl Deref for Handle<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            Self::Ambient(conn) => &**conn,
            Self::Pooled(conn) => &**conn,
        }
    }
}

impl DerefMut for Handle<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            Self::Ambient(conn) => &mut **conn,
            Self::Pooled(conn) => &mut **conn,
        }
    }
}

/// Current time as a fixed-width RFC 3339 string, so lexical order in
/// SQLite matches chronological order.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
