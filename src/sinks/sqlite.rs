//! SQLite table of every hit found so far.
use std::path::Path;

use async_trait::async_trait;
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use super::{Hit, HitStore};
use crate::error::SinkError;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Workers write one row per hit; hits are rare compared to probes.
const MAX_CONNECTIONS: u32 = 4;

/// Hits in the `valid_ids` table. Clones share the pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    async fn new(options: SqliteConnectOptions, max: u32) -> Result<Self, SinkError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect_with(options)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Opens (creating if needed) the database file and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_millis(1500));
        Self::new(options, MAX_CONNECTIONS).await
    }

    /// In-memory databases vanish with their connection, so the pool is
    /// limited to one.
    pub async fn connect_in_memory() -> Result<Self, SinkError> {
        let options = SqliteConnectOptions::new().filename(":memory:");
        Self::new(options, 1).await
    }

    /// Every recorded hit, oldest first.
    pub async fn hits(&self) -> Result<Vec<Hit>, SinkError> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT id, url, ext FROM valid_ids ORDER BY found_at, id, ext")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, url, extension)| Hit { id, url, extension })
            .collect())
    }

    /// Waits for open connections to be returned and closes them.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl HitStore for SqliteStore {
    /// Recording the same id and extension twice keeps the first row.
    async fn record_hit(&self, hit: &Hit) -> Result<(), SinkError> {
        let found_at = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO valid_ids (id, url, ext, found_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&hit.id)
        .bind(&hit.url)
        .bind(&hit.extension)
        .bind(found_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("{} was already recorded", hit.url);
        }
        Ok(())
    }
}
