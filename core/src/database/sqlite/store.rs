use rusqlite::{params_from_iter, Connection, Transaction};

use crate::database::sql_value::SqlValue;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Can not connect to the database: {0}")]
    CanNotConnect(String),

    #[error("{0}")]
    Other(String),
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: usize,
    pub last_insert_id: i64,
}

/// A shared handle to the store; every caller gets its own connection.
pub trait Store: Send + Sync {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError>;
}

pub trait StoreConnection {
    fn begin(&mut self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;
}

/// An open transaction. Dropping it without committing rolls it back.
pub trait StoreTransaction {
    /// Prepares and executes `sql` with `args` bound to its placeholders in order.
    fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

impl StoreConnection for Connection {
    fn begin(&mut self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        Ok(Box::new(self.transaction()?))
    }
}

impl StoreTransaction for Transaction<'_> {
    fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, StoreError> {
        let mut statement = self.prepare(sql)?;
        let rows_affected = statement.execute(params_from_iter(args.iter()))?;

        Ok(ExecResult { rows_affected, last_insert_id: self.last_insert_rowid() })
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        (*self).commit().map_err(StoreError::from)
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        (*self).rollback().map_err(StoreError::from)
    }
}
