use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Conflict handling mode as it appears in configuration.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UpsertMode {
    /// Plain INSERT, duplicates are left to the table's constraints
    InsertOnly,
    /// INSERT OR REPLACE
    #[default]
    Replace,
    /// INSERT OR REPLACE keeping the stored value of the preserved fields
    ReplacePreserving,
}

/// The type of write to compile for a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertPolicy {
    InsertOnly,
    ReplaceAll,
    /// Overwrite every column except these, which keep their currently stored value.
    ReplacePreserving(Vec<String>),
}

impl UpsertPolicy {
    pub fn preserved_fields(&self) -> &[String] {
        match self {
            UpsertPolicy::ReplacePreserving(fields) => fields,
            UpsertPolicy::InsertOnly | UpsertPolicy::ReplaceAll => &[],
        }
    }

    pub fn is_replace(&self) -> bool {
        !matches!(self, UpsertPolicy::InsertOnly)
    }

    pub fn is_preserved(&self, column: &str) -> bool {
        self.preserved_fields().iter().any(|field| field == column)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("primary_keys required if preserved_fields specified")]
    PrimaryKeysRequired,

    #[error("preserved_fields can not be used with upsert_mode insert-only")]
    PreservedFieldsRequireReplace,

    #[error("upsert_mode replace-preserving requires at least one preserved field")]
    NoPreservedFields,

    #[error("target_table can not be empty")]
    EmptyTargetTable,

    #[error("concurrency_level must be at least 1")]
    InvalidConcurrency,
}

/// Everything the compiler and executor need to know about how a batch is written,
/// apart from the table it goes to.
///
/// Constructed through [`WriteOptions::new`] so the primary key requirement is checked before any
/// record is looked at.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    policy: UpsertPolicy,
    primary_keys: Vec<String>,
    batch_size: usize,
}

impl Default for WriteOptions {
    /// Replace existing rows, no primary keys, [`DEFAULT_BATCH_SIZE`] records per statement.
    fn default() -> Self {
        Self { policy: UpsertPolicy::ReplaceAll, primary_keys: vec![], batch_size: DEFAULT_BATCH_SIZE }
    }
}

impl WriteOptions {
    pub fn new(
        policy: UpsertPolicy,
        primary_keys: Vec<String>,
        batch_size: usize,
    ) -> Result<Self, ConfigError> {
        if !policy.preserved_fields().is_empty() && primary_keys.is_empty() {
            return Err(ConfigError::PrimaryKeysRequired);
        }

        Ok(Self { policy, primary_keys, batch_size })
    }

    /// Builds options from the configured mode, resolving it to a concrete [`UpsertPolicy`].
    pub fn from_mode(
        mode: UpsertMode,
        primary_keys: Vec<String>,
        preserved_fields: Vec<String>,
        batch_size: usize,
    ) -> Result<Self, ConfigError> {
        if !preserved_fields.is_empty() && primary_keys.is_empty() {
            return Err(ConfigError::PrimaryKeysRequired);
        }

        let policy = match mode {
            UpsertMode::InsertOnly if !preserved_fields.is_empty() => {
                return Err(ConfigError::PreservedFieldsRequireReplace)
            }
            UpsertMode::InsertOnly => UpsertPolicy::InsertOnly,
            UpsertMode::Replace if preserved_fields.is_empty() => UpsertPolicy::ReplaceAll,
            UpsertMode::Replace => UpsertPolicy::ReplacePreserving(preserved_fields),
            UpsertMode::ReplacePreserving if preserved_fields.is_empty() => {
                return Err(ConfigError::NoPreservedFields)
            }
            UpsertMode::ReplacePreserving => UpsertPolicy::ReplacePreserving(preserved_fields),
        };

        Self::new(policy, primary_keys, batch_size)
    }

    pub fn policy(&self) -> &UpsertPolicy {
        &self.policy
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    /// Records per statement, 0 meaning the whole batch goes in one statement.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Every SQLite keyword, any of which needs quoting when used as an identifier.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "abort", "action", "add", "after", "all", "alter", "always", "analyze", "and", "as", "asc",
    "attach", "autoincrement", "before", "begin", "between", "by", "cascade", "case", "cast",
    "check", "collate", "column", "commit", "conflict", "constraint", "create", "cross", "current",
    "current_date", "current_time", "current_timestamp", "database", "default", "deferrable",
    "deferred", "delete", "desc", "detach", "distinct", "do", "drop", "each", "else", "end",
    "escape", "except", "exclude", "exclusive", "exists", "explain", "fail", "filter", "first",
    "following", "for", "foreign", "from", "full", "generated", "glob", "group", "groups", "having",
    "if", "ignore", "immediate", "in", "index", "indexed", "initially", "inner", "insert",
    "instead", "intersect", "into", "is", "isnull", "join", "key", "last", "left", "like", "limit",
    "match", "materialized", "natural", "no", "not", "nothing", "notnull", "null", "nulls", "of",
    "offset", "on", "or", "order", "others", "outer", "over", "partition", "plan", "pragma",
    "preceding", "primary", "query", "raise", "range", "recursive", "references", "regexp",
    "reindex", "release", "rename", "replace", "restrict", "returning", "right", "rollback", "row",
    "rows", "savepoint", "select", "set", "table", "temp", "temporary", "then", "ties", "to",
    "transaction", "trigger", "unbounded", "union", "unique", "update", "using", "vacuum", "values",
    "view", "virtual", "when", "where", "window", "with", "without",
];
