use tracing::{debug, error, info};

use crate::database::batch_operations::{ConfigError, WriteOptions};
use crate::database::sqlite::query_builder::{
    build_insert_statement, resolve_columns, CompileError, CompiledStatement,
};
use crate::database::sqlite::store::{Store, StoreError, StoreTransaction};
use crate::types::Record;

#[derive(thiserror::Error, Debug)]
pub enum BatchInsertError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Could not build INSERT: {0}")]
    Compile(#[from] CompileError),

    #[error("Could not write data to SQLite: {0}")]
    Store(#[from] StoreError),
}

/// What one chunk's statement did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStats {
    pub rows: usize,
    pub rows_affected: usize,
    pub last_insert_id: i64,
}

/// Splits records into statement sized chunks, a `batch_size` of 0 meaning a single chunk.
pub fn chunk_records(records: &[Record], batch_size: usize) -> std::slice::Chunks<'_, Record> {
    let size = if batch_size == 0 { records.len().max(1) } else { batch_size };
    records.chunks(size)
}

fn compile_chunk(
    records: &[Record],
    table_name: &str,
    options: &WriteOptions,
) -> Result<CompiledStatement, CompileError> {
    let columns = resolve_columns(records, options.policy().preserved_fields());
    build_insert_statement(records, &columns, table_name, options)
}

/// The statements [`insert_batch`] would execute for `records`, one per chunk, without touching a
/// store.
pub fn compile_batch(
    records: &[Record],
    table_name: &str,
    options: &WriteOptions,
) -> Result<Vec<CompiledStatement>, CompileError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    chunk_records(records, options.batch_size())
        .map(|chunk| compile_chunk(chunk, table_name, options))
        .collect()
}

fn insert_chunk(
    tx: &mut dyn StoreTransaction,
    records: &[Record],
    table_name: &str,
    options: &WriteOptions,
) -> Result<ChunkStats, BatchInsertError> {
    info!("SqliteInsert: building INSERT for {} records", records.len());

    let statement = compile_chunk(records, table_name, options)?;

    debug!("SqliteInsert: {}", statement.sql);
    debug!("SqliteInsert: values {:?}", statement.args);

    let result = tx.execute(&statement.sql, &statement.args)?;

    info!(
        "SqliteInsert: rows affected = {}, last insert ID = {}",
        result.rows_affected, result.last_insert_id
    );

    Ok(ChunkStats {
        rows: records.len(),
        rows_affected: result.rows_affected,
        last_insert_id: result.last_insert_id,
    })
}

/// Writes `records` to `table_name` in chunks of `options.batch_size()`, all inside one
/// transaction.
///
/// Chunks run strictly one after another. The first failing chunk rolls the whole transaction
/// back and its error is returned, so either every record is written or none is. The commit is
/// issued once, after the last chunk has executed.
pub fn insert_batch(
    store: &dyn Store,
    records: &[Record],
    table_name: &str,
    options: &WriteOptions,
) -> Result<Vec<ChunkStats>, BatchInsertError> {
    if records.is_empty() {
        debug!("SqliteInsert: no records for {}, skipping", table_name);
        return Ok(Vec::new());
    }

    let mut conn = store.connect()?;
    let mut tx = conn.begin()?;
    let mut stats = Vec::new();

    for chunk in chunk_records(records, options.batch_size()) {
        match insert_chunk(tx.as_mut(), chunk, table_name, options) {
            Ok(chunk_stats) => stats.push(chunk_stats),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!("SqliteInsert: rollback of {} failed: {}", table_name, rollback_err);
                }
                return Err(err);
            }
        }
    }

    tx.commit()?;

    Ok(stats)
}
