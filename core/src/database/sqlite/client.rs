use std::{env, path::PathBuf, time::Duration};

use dotenv::dotenv;
use rusqlite::Connection;
use tracing::{error, info};

use crate::database::sqlite::store::{Store, StoreConnection, StoreError};

pub const DEFAULT_DATABASE_PATH: &str = "./sqlsink.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// `DATABASE_URL` (loading `.env` first), defaulting to [`DEFAULT_DATABASE_PATH`].
pub fn connection_string() -> String {
    dotenv().ok();
    env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string())
}

#[derive(thiserror::Error, Debug)]
pub enum SqliteConnectionError {
    #[error("Can not connect to the database please make sure your connection string is correct: {0}")]
    CanNotConnectToDatabase(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to run the connection task: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Store backed by a SQLite database file.
///
/// Connections are opened per call so every concurrent writer gets its own transaction scope;
/// WAL mode and a busy timeout let them share the file.
#[derive(Debug, Clone)]
pub struct SqliteClient {
    db_path: String,
}

fn open(db_path: &str) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

impl SqliteClient {
    pub async fn connect_to(db_path: impl Into<String>) -> Result<Self, SqliteConnectionError> {
        let db_path = db_path.into();

        info!("Connecting to SQLite database at: {}", db_path);

        let path = db_path.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = PathBuf::from(&path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        error!("Failed to create parent directories for SQLite database: {}", e);
                        SqliteConnectionError::CanNotConnectToDatabase(e.to_string())
                    })?;
                }
            }

            let conn = open(&path).map_err(|e| {
                error!("Error connecting to SQLite database: {}", e);
                SqliteConnectionError::CanNotConnectToDatabase(e.to_string())
            })?;

            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

            info!("Successfully connected to SQLite database");
            Ok::<(), SqliteConnectionError>(())
        })
        .await??;

        Ok(SqliteClient { db_path })
    }

    /// Runs one or more `;` separated statements, used for DDL.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), StoreError> {
        let db_path = self.db_path.clone();
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            conn.execute_batch(&sql)?;
            Ok::<(), StoreError>(())
        })
        .await
        .map_err(|e| StoreError::Other(e.to_string()))?
    }
}

impl Store for SqliteClient {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let conn = open(&self.db_path).map_err(|e| StoreError::CanNotConnect(e.to_string()))?;
        Ok(Box::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sql_value::SqlValue;

    #[tokio::test]
    async fn test_connect_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        let client = SqliteClient::connect_to(path.to_string_lossy()).await.unwrap();

        client.batch_execute("CREATE TABLE t (a INTEGER);").await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_connections_share_the_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        let client = SqliteClient::connect_to(path.to_string_lossy()).await.unwrap();
        client.batch_execute("CREATE TABLE t (a INTEGER);").await.unwrap();

        let mut conn = client.connect().unwrap();
        let mut tx = conn.begin().unwrap();
        let result = tx.execute("INSERT INTO t(a) VALUES (?)", &[SqlValue::Integer(7)]).unwrap();
        tx.commit().unwrap();

        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.last_insert_id, 1);

        let check = Connection::open(&path).unwrap();
        let a: i64 = check.query_row("SELECT a FROM t", [], |row| row.get(0)).unwrap();

        assert_eq!(a, 7);
    }
}
