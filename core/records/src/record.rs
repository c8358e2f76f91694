//! Flat JSON record model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single row in a named collection: a stable id plus a flat field map.
///
/// Fields are kept as loose JSON; typed views (profiles, work items, policies)
/// are parsed out by the crates that own those collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field assignment, used when seeding stores.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Looks up a field by name; `"id"` addresses the record id itself so
    /// filters can match on it uniformly.
    pub fn value_of(&self, field: &str) -> Option<Value> {
        if field == "id" {
            return Some(Value::String(self.id.clone()));
        }
        self.fields.get(field).cloned()
    }

    /// Field as a string, if present and non-null.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Field as an integer, if present and non-null.
    pub fn i64_field(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }
}
