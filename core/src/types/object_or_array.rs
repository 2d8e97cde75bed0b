use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A payload is either one JSON object or an array of them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ObjectOrArray {
    Single(Map<String, Value>),
    Multiple(Vec<Map<String, Value>>),
}

impl ObjectOrArray {
    pub fn into_vec(self) -> Vec<Map<String, Value>> {
        match self {
            ObjectOrArray::Single(object) => vec![object],
            ObjectOrArray::Multiple(objects) => objects,
        }
    }
}
