use serde_json::Value;

use crate::types::object_or_array::ObjectOrArray;
use crate::types::Record;

pub const ENVELOPE_TABLE_KEY: &str = "table";
pub const ENVELOPE_PAYLOAD_KEY: &str = "payload";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Data must be a JSON object or an array of JSON objects, got {0}")]
    NotObjectOrArray(String),

    #[error("Routed envelope is missing its `table` name")]
    MissingTable,

    #[error("Routed envelope is missing its `payload`")]
    MissingPayload,
}

/// An input item, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEnvelope {
    /// Records for the stage's configured table.
    Batch(Vec<Record>),
    /// Records for an explicitly named table.
    Routed { table: String, records: Vec<Record> },
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "an array containing non-object values".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

/// Turns a payload into its ordered records.
///
/// Only the structural shape is checked here, value types are left to the store.
pub fn normalize_records(payload: &Value) -> Result<Vec<Record>, ParseError> {
    serde_json::from_value::<ObjectOrArray>(payload.clone())
        .map(ObjectOrArray::into_vec)
        .map_err(|_| ParseError::NotObjectOrArray(describe(payload)))
}

/// An object is a routed envelope when it carries a `payload` and nothing besides `table`.
pub fn is_routed_envelope(value: &Value) -> bool {
    value.as_object().is_some_and(|object| {
        object.contains_key(ENVELOPE_PAYLOAD_KEY)
            && object.keys().all(|key| key == ENVELOPE_TABLE_KEY || key == ENVELOPE_PAYLOAD_KEY)
    })
}

impl PipelineEnvelope {
    pub fn decode(data: &Value) -> Result<Self, ParseError> {
        if !is_routed_envelope(data) {
            return normalize_records(data).map(PipelineEnvelope::Batch);
        }

        let table = match data.get(ENVELOPE_TABLE_KEY) {
            Some(Value::String(table)) if !table.trim().is_empty() => table.clone(),
            _ => return Err(ParseError::MissingTable),
        };

        let records = match data.get(ENVELOPE_PAYLOAD_KEY) {
            None | Some(Value::Null) => return Err(ParseError::MissingPayload),
            Some(payload) => normalize_records(payload)?,
        };

        Ok(PipelineEnvelope::Routed { table, records })
    }

    /// The routed table, or `default_table` for a plain batch.
    pub fn table<'a>(&'a self, default_table: &'a str) -> &'a str {
        match self {
            PipelineEnvelope::Batch(_) => default_table,
            PipelineEnvelope::Routed { table, .. } => table,
        }
    }

    pub fn records(&self) -> &[Record] {
        match self {
            PipelineEnvelope::Batch(records) | PipelineEnvelope::Routed { records, .. } => records,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            PipelineEnvelope::Batch(records) | PipelineEnvelope::Routed { records, .. } => records,
        }
    }
}
