use sqlx::{
    Sqlite, SqlitePool,
    migrate::{MigrateDatabase, Migrator},
    sqlite::SqlitePoolOptions,
};
use std::{
    path::PathBuf,
    sync::LazyLock,
    time::{Duration, SystemTime},
};
use thiserror::Error;

pub mod conversations;
pub mod messages;
pub mod typing_signals;
pub mod user_profiles;
pub mod utils;

pub static MIGRATOR: LazyLock<Migrator> = LazyLock::new(|| sqlx::migrate!("./db_migrations"));

const DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DB_MAX_CONNECTIONS: u32 = 10;
const DB_BUSY_TIMEOUT_MS: u32 = 5000;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),
    #[error("Invalid timestamp: {timestamp} cannot be converted to DateTime")]
    InvalidTimestamp { timestamp: i64 },
}

#[derive(Clone, Debug)]
pub struct Database {
    pub pool: SqlitePool,
    pub path: PathBuf,
    pub last_connected: SystemTime,
}

impl Database {
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}", db_path.display());

        tracing::debug!(target: "jobchat::database::new", "Checking if DB exists...{:?}", db_url);
        match Sqlite::database_exists(&db_url).await {
            Ok(true) => {
                tracing::debug!(target: "jobchat::database::new", "DB exists");
            }
            Ok(false) => {
                tracing::debug!(target: "jobchat::database::new", "DB does not exist, creating...");
                Sqlite::create_database(&db_url).await.map_err(|e| {
                    tracing::error!(target: "jobchat::database::new", "Error creating DB: {:?}", e);
                    DatabaseError::Sqlx(e)
                })?;
            }
            Err(e) => {
                tracing::warn!(
                    target: "jobchat::database::new",
                    "Could not check if database exists: {:?}, attempting to create",
                    e
                );
                Sqlite::create_database(&db_url).await.map_err(|e| {
                    tracing::error!(target: "jobchat::database::new", "Error creating DB: {:?}", e);
                    DatabaseError::Sqlx(e)
                })?;
            }
        }

        let pool = Self::create_connection_pool(&db_url).await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self {
            pool,
            path: db_path,
            last_connected: SystemTime::now(),
        })
    }

    async fn create_connection_pool(db_url: &str) -> Result<SqlitePool, DatabaseError> {
        let pool = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS))
            .max_connections(DB_MAX_CONNECTIONS)
            .after_connect(|conn, _| {
                Box::pin(async move {
                    let conn = &mut *conn;
                    sqlx::query("PRAGMA journal_mode=WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query(&format!("PRAGMA busy_timeout={DB_BUSY_TIMEOUT_MS}"))
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&format!("{db_url}?mode=rwc"))
            .await?;
        Ok(pool)
    }

    /// Runs pending migrations. Safe to call repeatedly.
    pub async fn migrate_up(&self) -> Result<(), DatabaseError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Drops every table, migration tracking included, and re-creates the schema.
    pub async fn delete_all_data(&self) -> Result<(), DatabaseError> {
        let mut txn = self.pool.begin().await?;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master
             WHERE type='table'
             AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *txn)
        .await?;

        for (table_name,) in tables {
            let drop_query = format!("DROP TABLE IF EXISTS {}", table_name);
            sqlx::query(&drop_query).execute(&mut *txn).await?;
        }

        txn.commit().await?;

        MIGRATOR.run(&self.pool).await?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Database;
    use tempfile::TempDir;

    pub(crate) async fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path)
            .await
            .expect("Failed to create test database");
        (db, temp_dir)
    }
}
