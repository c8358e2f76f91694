//! Query predicates and field patches.

use serde_json::Value;

use crate::record::Record;

/// A single field predicate: equality or set membership.
#[derive(Debug, Clone)]
pub enum Predicate {
    Eq(Value),
    In(Vec<Value>),
}

/// Conjunction of field predicates. An empty filter matches every record.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, Predicate)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Predicate::Eq(value.into())));
        self
    }

    pub fn one_of<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.clauses.push((field.into(), Predicate::In(values)));
        self
    }

    /// Whether a record satisfies every clause. A missing field never matches.
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|(field, predicate)| {
            let Some(actual) = record.value_of(field) else {
                return false;
            };
            match predicate {
                Predicate::Eq(expected) => actual == *expected,
                Predicate::In(expected) => expected.contains(&actual),
            }
        })
    }
}

#[derive(Debug, Clone)]
enum PatchOp {
    Set(Value),
    Clear,
}

/// Ordered field mutations applied to every record a filter matches.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    ops: Vec<(String, PatchOp)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push((field.into(), PatchOp::Set(value.into())));
        self
    }

    /// Removes the field entirely; subsequent reads see it as absent.
    pub fn clear(mut self, field: impl Into<String>) -> Self {
        self.ops.push((field.into(), PatchOp::Clear));
        self
    }

    pub fn apply(&self, record: &mut Record) {
        for (field, op) in &self.ops {
            match op {
                PatchOp::Set(value) => {
                    record.fields.insert(field.clone(), value.clone());
                }
                PatchOp::Clear => {
                    record.fields.remove(field);
                }
            }
        }
    }
}
