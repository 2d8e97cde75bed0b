use serde::{Deserialize, Serialize};

use crate::database::batch_operations::{ConfigError, UpsertMode, WriteOptions, DEFAULT_BATCH_SIZE};

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_concurrency_level() -> usize {
    1
}

/// Settings for one SQLite writer stage.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WriterConfig {
    /// Table written to unless an item routes itself elsewhere.
    pub target_table: String,

    #[serde(default)]
    pub upsert_mode: UpsertMode,

    /// Natural key of the table, used to look up the stored values of `preserved_fields`.
    /// Every record must carry a value for each of these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_keys: Vec<String>,

    /// Columns that keep their stored value when a row is replaced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preserved_fields: Vec<String>,

    /// Number of items written at the same time. `1` keeps output in input order.
    #[serde(default = "default_concurrency_level")]
    pub concurrency_level: usize,

    /// Records per INSERT statement, `0` writes each item with a single statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl WriterConfig {
    pub fn new(target_table: impl Into<String>) -> Self {
        Self {
            target_table: target_table.into(),
            upsert_mode: UpsertMode::default(),
            primary_keys: vec![],
            preserved_fields: vec![],
            concurrency_level: default_concurrency_level(),
            batch_size: default_batch_size(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_table.trim().is_empty() {
            return Err(ConfigError::EmptyTargetTable);
        }

        if self.concurrency_level == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        self.write_options().map(|_| ())
    }

    pub fn write_options(&self) -> Result<WriteOptions, ConfigError> {
        WriteOptions::from_mode(
            self.upsert_mode,
            self.primary_keys.clone(),
            self.preserved_fields.clone(),
            self.batch_size,
        )
    }
}
