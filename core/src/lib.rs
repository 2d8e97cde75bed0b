// public
pub mod database;
pub mod manifest;
pub mod pipeline;
pub mod types;

mod logger;
pub use logger::{console_dispatch, setup_info_logger, setup_logger};

pub use database::batch_operations::{UpsertMode, UpsertPolicy, WriteOptions};
pub use database::sql_value::SqlValue;
pub use database::sqlite::{
    batch_insert::{compile_batch, insert_batch, BatchInsertError, ChunkStats},
    client::{SqliteClient, SqliteConnectionError},
    query_builder::{build_insert_statement, resolve_columns, CompiledStatement},
    store::{Store, StoreConnection, StoreError, StoreTransaction},
};
pub use manifest::{
    config::WriterConfig,
    yaml::{read_manifest, Manifest, ReadManifestError, YAML_CONFIG_NAME},
};
pub use pipeline::{
    envelope::{ParseError, PipelineEnvelope},
    error::PipelineError,
    kill_switch::{kill_switch, KillReceiver, KillSwitch},
    processor::DataProcessor,
    runner::{Pipeline, PipelineRun},
    sql_reader_sqlite_writer::{QueryReader, SqlReaderSqliteWriter},
    sqlite_writer::SqliteWriter,
};
pub use types::Record;

// export 3rd party dependencies
pub use async_trait::async_trait;
pub use tracing::level_filters::LevelFilter;
