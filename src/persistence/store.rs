//! SQLite-based run history store

use crate::core::ExecutionStatus;
use crate::execution::{RunResult, StepRecord};
use crate::persistence::PersistenceBackend;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

const COLUMNS: &str = "id, pipeline_name, status, failed_step, started_at, completed_at, steps";

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Open (or create) a store at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database {}", db_path.display()))?;

        Self::with_pool(pool).await
    }

    /// A store that lives only as long as this value
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        Self::with_pool(pool).await
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Self::new(&db_path).await
    }

    /// `<data dir>/linear-ci/runs.db`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("linear-ci")
            .join("runs.db")
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                status TEXT NOT NULL,
                failed_step TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                steps TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_runs_pipeline_name ON runs(pipeline_name)",
            "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize database schema")?;
        }

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn from_row(row: &SqliteRow) -> Result<RunResult> {
        let id: String = row.try_get("id")?;
        let status: String = row.try_get("status")?;
        let steps: String = row.try_get("steps")?;
        let outcomes: Vec<StepRecord> =
            serde_json::from_str(&steps).context("Corrupt step outcomes in run history")?;

        Ok(RunResult {
            execution_id: Uuid::parse_str(&id)
                .with_context(|| format!("Corrupt run id '{}' in run history", id))?,
            pipeline_name: row.try_get("pipeline_name")?,
            status: ExecutionStatus::parse(&status)
                .ok_or_else(|| anyhow!("Unknown run status '{}'", status))?,
            failed_step: row.try_get("failed_step")?,
            outcomes,
            started_at: Self::from_naive(row.try_get("started_at")?),
            completed_at: Self::from_naive(row.try_get("completed_at")?),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, run: &RunResult) -> Result<()> {
        let steps = serde_json::to_string(&run.outcomes)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, status, failed_step, started_at, completed_at, steps)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(run.execution_id.to_string())
        .bind(&run.pipeline_name)
        .bind(run.status.as_str())
        .bind(run.failed_step.as_deref())
        .bind(Self::to_naive(run.started_at))
        .bind(Self::to_naive(run.completed_at))
        .bind(steps)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunResult>> {
        let row = sqlx::query(&format!("SELECT {} FROM runs WHERE id = ?1", COLUMNS))
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_runs(&self, pipeline_name: Option<&str>, limit: Option<usize>) -> Result<Vec<RunResult>> {
        // A negative LIMIT means no limit in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let rows = match pipeline_name {
            Some(name) => {
                sqlx::query(&format!(
                    "SELECT {} FROM runs WHERE pipeline_name = ?1 ORDER BY started_at DESC LIMIT ?2",
                    COLUMNS
                ))
                .bind(name)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM runs ORDER BY started_at DESC LIMIT ?1",
                    COLUMNS
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list runs")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn delete_run(&self, execution_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM runs WHERE id = ?1")
            .bind(execution_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete run")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM runs
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        rows.iter()
            .map(|row| row.try_get("pipeline_name").map_err(Into::into))
            .collect()
    }
}
