use super::KvBackend;
use async_trait::async_trait;
use beacon_core::{config::shellexpand, error::BeaconError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// `kv` table in a SQLite database. Safe to share between processes.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (creating if missing) the database at `db_path` and run migrations.
    pub async fn open(db_path: &str) -> Result<Self, BeaconError> {
        let db_path = shellexpand(db_path);

        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BeaconError::StoreUnavailable(format!("failed to create data dir: {e}"))
            })?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| BeaconError::Config(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| {
                BeaconError::StoreUnavailable(format!("failed to connect to sqlite: {e}"))
            })?;

        Self::run_migrations(&pool).await?;
        info!("SQLite store initialized at {db_path}");

        Ok(Self { pool })
    }

    /// A private in-memory database, for tests and throwaway runs.
    pub async fn in_memory() -> Result<Self, BeaconError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| BeaconError::Config(format!("invalid db path: {e}")))?;
        // One connection, or every checkout would see a different empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| {
                BeaconError::StoreUnavailable(format!("failed to open sqlite: {e}"))
            })?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Run SQL migrations, tracking which have already been applied.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), BeaconError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| {
            BeaconError::StoreUnavailable(format!("failed to create migrations table: {e}"))
        })?;

        let migrations: &[(&str, &str)] = &[("001_kv", include_str!("../../migrations/001_kv.sql"))];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        BeaconError::StoreUnavailable(format!(
                            "failed to check migration {name}: {e}"
                        ))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql).execute(pool).await.map_err(|e| {
                BeaconError::StoreUnavailable(format!("migration {name} failed: {e}"))
            })?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| {
                    BeaconError::StoreUnavailable(format!("failed to record migration {name}: {e}"))
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BeaconError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BeaconError::StoreUnavailable(format!("read {key} failed: {e}")))?;
        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), BeaconError> {
        sqlx::query(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now')) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| BeaconError::StoreUnavailable(format!("write {key} failed: {e}")))?;
        Ok(())
    }
}
