//! SQL generation for batched SQLite inserts.
//!
//! A batch compiles to a single multi-row statement:
//!
//! ```text
//! INSERT [OR REPLACE] INTO <table>(<sorted columns>) VALUES (<row>),(<row>),...
//! ```
//!
//! Under [`UpsertPolicy::ReplacePreserving`] each preserved column is bound to a correlated
//! subquery reading its currently stored value, keyed by the record's primary key values:
//!
//! ```text
//! (SELECT <col> FROM <table> WHERE <pk1> = ? AND <pk2> = ?)
//! ```

use std::collections::BTreeSet;

use crate::database::batch_operations::{UpsertPolicy, WriteOptions, RESERVED_KEYWORDS};
use crate::database::sql_value::SqlValue;
use crate::types::Record;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Missing value for primary key: {0}")]
    MissingPrimaryKey(String),

    #[error("Can not build an INSERT for an empty batch")]
    EmptyBatch,

    #[error("Can not build an INSERT for records without any fields")]
    NoColumns,

    #[error("Row template has {placeholders} placeholders but binds {bound} values")]
    ArgumentCountMismatch { placeholders: usize, bound: usize },
}

/// SQL text and the arguments for its placeholders, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

/// Quotes an identifier if it's a keyword or not a plain identifier.
pub fn quote_identifier(name: &str) -> String {
    let plain = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if plain && !RESERVED_KEYWORDS.contains(&name.to_ascii_lowercase().as_str()) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Formats a table name, handling schema.table format.
pub fn format_table_name(table_name: &str) -> String {
    match table_name.split_once('.') {
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
            format!("{}.{}", quote_identifier(schema), quote_identifier(table))
        }
        _ => quote_identifier(table_name),
    }
}

/// The sorted union of every record's keys and the preserved fields.
///
/// Byte-wise ordering fixes both the column list and the argument order, so identical batches
/// always compile to identical statements whatever order their keys arrived in.
pub fn resolve_columns(records: &[Record], preserved_fields: &[String]) -> Vec<String> {
    let mut columns: BTreeSet<&str> =
        records.iter().flat_map(|record| record.keys().map(String::as_str)).collect();
    columns.extend(preserved_fields.iter().map(String::as_str));

    columns.into_iter().map(str::to_string).collect()
}

/// Builds `INSERT [OR REPLACE] INTO <table>(<columns>) VALUES`.
pub fn build_insert_header(formatted_table_name: &str, columns: &[String], policy: &UpsertPolicy) -> String {
    let formatted_columns =
        columns.iter().map(|col| quote_identifier(col)).collect::<Vec<_>>().join(",");

    if policy.is_replace() {
        format!("INSERT OR REPLACE INTO {}({}) VALUES", formatted_table_name, formatted_columns)
    } else {
        // duplicate keys are resolved by the ON CONFLICT clause of the table definition
        format!("INSERT INTO {}({}) VALUES", formatted_table_name, formatted_columns)
    }
}

/// Builds the correlated subquery that reads a preserved column's stored value.
pub fn build_preserved_subquery(formatted_table_name: &str, column: &str, primary_keys: &[String]) -> String {
    let conditions = primary_keys
        .iter()
        .map(|key| format!("{} = ?", quote_identifier(key)))
        .collect::<Vec<_>>()
        .join(" AND ");

    format!("(SELECT {} FROM {} WHERE {})", quote_identifier(column), formatted_table_name, conditions)
}

/// One `(…)` row group plus the record field feeding each of its placeholders.
///
/// A preserved column binds the primary key fields rather than its own value, so the same record
/// field may appear several times.
pub struct RowTemplate<'a> {
    pub sql: String,
    pub bound_fields: Vec<&'a str>,
    placeholders: usize,
}

pub fn build_row_template<'a>(
    formatted_table_name: &str,
    columns: &'a [String],
    options: &'a WriteOptions,
) -> RowTemplate<'a> {
    let policy = options.policy();
    let mut bound_fields = Vec::new();
    let mut placeholders = 0;

    let values = columns
        .iter()
        .map(|column| {
            if policy.is_replace() && policy.is_preserved(column) {
                placeholders += options.primary_keys().len();
                bound_fields.extend(options.primary_keys().iter().map(String::as_str));
                build_preserved_subquery(formatted_table_name, column, options.primary_keys())
            } else {
                placeholders += 1;
                bound_fields.push(column.as_str());
                "?".to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",");

    RowTemplate { sql: format!("({})", values), bound_fields, placeholders }
}

// a key present as null is bound as NULL, only an absent key is missing
fn is_missing(record: &Record, field: &str) -> bool {
    !record.contains_key(field)
}

/// Compiles one batch into a single multi-row statement.
///
/// Every declared primary key must be present in every record; if one is not, nothing is produced.
pub fn build_insert_statement(
    records: &[Record],
    columns: &[String],
    table_name: &str,
    options: &WriteOptions,
) -> Result<CompiledStatement, CompileError> {
    if records.is_empty() {
        return Err(CompileError::EmptyBatch);
    }

    if columns.is_empty() {
        return Err(CompileError::NoColumns);
    }

    for record in records {
        if let Some(key) = options.primary_keys().iter().find(|key| is_missing(record, key)) {
            return Err(CompileError::MissingPrimaryKey(key.clone()));
        }
    }

    let formatted_table_name = format_table_name(table_name);
    let header = build_insert_header(&formatted_table_name, columns, options.policy());
    let template = build_row_template(&formatted_table_name, columns, options);

    if template.placeholders != template.bound_fields.len() {
        return Err(CompileError::ArgumentCountMismatch {
            placeholders: template.placeholders,
            bound: template.bound_fields.len(),
        });
    }

    let mut args = Vec::with_capacity(records.len() * template.bound_fields.len());
    for record in records {
        args.extend(template.bound_fields.iter().map(|field| SqlValue::from(record.get(*field))));
    }

    let rows = vec![template.sql.as_str(); records.len()].join(",");

    Ok(CompiledStatement { sql: format!("{} {}", header, rows), args })
}
