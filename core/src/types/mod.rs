use serde_json::{Map, Value};

pub mod object_or_array;

/// One flat row of field values keyed by column name.
pub type Record = Map<String, Value>;
