// SQLite snapshot store via sqlx. One table, indexed by (environment, node_id, created_at).
// Ties on created_at resolve by insertion id so "most recent" never goes backwards.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

use super::SnapshotStore;
use crate::error::PersistenceError;
use crate::models::{Environment, NodeSnapshot};

const SELECT_COLUMNS: &str = "SELECT environment, node_id, address, block_count, cemented_count, \
     major_version, minor_version, patch_version, pre_release_version, created_at \
     FROM node_snapshots";

pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// Connect to SQLite at `path`, create parent dir and DB if missing, enable WAL + pragmas.
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Create table and index if they don't exist.
    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS node_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                environment TEXT NOT NULL,
                node_id TEXT NOT NULL,
                address TEXT NOT NULL,
                block_count INTEGER NOT NULL,
                cemented_count INTEGER NOT NULL,
                major_version TEXT NOT NULL,
                minor_version TEXT NOT NULL,
                patch_version TEXT NOT NULL,
                pre_release_version TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_env_node_created_at ON node_snapshots(environment, node_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_env_created_at ON node_snapshots(environment, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn parse_row(row: &SqliteRow) -> Result<NodeSnapshot, sqlx::Error> {
        let environment: String = row.try_get("environment")?;
        let environment = Environment::from_str(&environment)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let block_count: i64 = row.try_get("block_count")?;
        let cemented_count: i64 = row.try_get("cemented_count")?;
        Ok(NodeSnapshot {
            environment,
            node_id: row.try_get("node_id")?,
            address: row.try_get("address")?,
            block_count: block_count.max(0) as u64,
            cemented_count: cemented_count.max(0) as u64,
            major_version: row.try_get("major_version")?,
            minor_version: row.try_get("minor_version")?,
            patch_version: row.try_get("patch_version")?,
            pre_release_version: row.try_get("pre_release_version")?,
            timestamp: row.try_get("created_at")?,
        })
    }
}

// SQLite integers are i64; a larger count cannot be stored faithfully.
fn count_to_i64(count: u64) -> Result<i64, PersistenceError> {
    i64::try_from(count).map_err(|e| PersistenceError::Write(sqlx::Error::Encode(Box::new(e))))
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    #[instrument(skip(self, snapshots), fields(repo = "snapshots", operation = "append_batch", snapshots_count = snapshots.len()))]
    async fn append_batch(&self, snapshots: &[NodeSnapshot]) -> Result<(), PersistenceError> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(PersistenceError::Write)?;
        for s in snapshots {
            sqlx::query(
                "INSERT INTO node_snapshots (environment, node_id, address, block_count, cemented_count, major_version, minor_version, patch_version, pre_release_version, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(s.environment.as_str())
            .bind(&s.node_id)
            .bind(&s.address)
            .bind(count_to_i64(s.block_count)?)
            .bind(count_to_i64(s.cemented_count)?)
            .bind(&s.major_version)
            .bind(&s.minor_version)
            .bind(&s.patch_version)
            .bind(&s.pre_release_version)
            .bind(s.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(PersistenceError::Write)?;
        }
        tx.commit().await.map_err(PersistenceError::Write)?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "snapshots", operation = "query_latest_before"))]
    async fn query_latest_before(
        &self,
        node_id: &str,
        environment: Environment,
        not_after: i64,
        max_age_ms: i64,
    ) -> Result<Option<NodeSnapshot>, PersistenceError> {
        let sql = format!(
            "{} WHERE environment = $1 AND node_id = $2 AND created_at <= $3 AND created_at >= $4 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(environment.as_str())
            .bind(node_id)
            .bind(not_after)
            .bind(not_after.saturating_sub(max_age_ms))
            .fetch_optional(&self.pool)
            .await
            .map_err(PersistenceError::Read)?;
        row.as_ref()
            .map(Self::parse_row)
            .transpose()
            .map_err(PersistenceError::Read)
    }

    #[instrument(skip(self), fields(repo = "snapshots", operation = "query_range"))]
    async fn query_range(
        &self,
        node_id: Option<&str>,
        environment: Environment,
        from: i64,
        to: i64,
    ) -> Result<Vec<NodeSnapshot>, PersistenceError> {
        let rows = match node_id {
            Some(node_id) => {
                let sql = format!(
                    "{} WHERE environment = $1 AND node_id = $2 \
                     AND created_at >= $3 AND created_at < $4 ORDER BY created_at ASC, id ASC",
                    SELECT_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(environment.as_str())
                    .bind(node_id)
                    .bind(from)
                    .bind(to)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "{} WHERE environment = $1 \
                     AND created_at >= $2 AND created_at < $3 ORDER BY created_at ASC, id ASC",
                    SELECT_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(environment.as_str())
                    .bind(from)
                    .bind(to)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(PersistenceError::Read)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(Self::parse_row(row).map_err(PersistenceError::Read)?);
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(repo = "snapshots", operation = "prune_before"))]
    async fn prune_before(&self, cutoff: i64) -> Result<u64, PersistenceError> {
        let r = sqlx::query("DELETE FROM node_snapshots WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::Write)?;
        Ok(r.rows_affected())
    }

    #[instrument(skip(self), fields(repo = "snapshots", operation = "vacuum"))]
    async fn vacuum(&self) -> Result<(), PersistenceError> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::Write)?;
        Ok(())
    }
}
