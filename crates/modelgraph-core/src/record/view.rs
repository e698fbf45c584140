//! Read-only access to a live record.

use super::{FieldValue, LocalId, RecordSet};
use crate::catalog::Model;
use crate::command::FieldInput;
use crate::manager::{ModelManager, RecordState};
use serde_json::{Map, Value};
use std::fmt;

static NULL: Value = Value::Null;

/// A borrowed view of one record.
///
/// Views are what compute methods, instance methods and query predicates
/// receive. They cannot mutate the graph.
#[derive(Clone, Copy)]
pub struct RecordView<'a> {
    manager: &'a ModelManager,
    state: &'a RecordState,
    model: &'a Model,
}

impl<'a> RecordView<'a> {
    pub(crate) fn new(manager: &'a ModelManager, state: &'a RecordState, model: &'a Model) -> Self {
        Self {
            manager,
            state,
            model,
        }
    }

    /// Identifier of the record.
    pub fn local_id(&self) -> &'a LocalId {
        &self.state.id
    }

    /// Name of the record's model.
    pub fn model_name(&self) -> &'a str {
        self.model.name()
    }

    /// Resolved model of the record.
    pub fn model(&self) -> &'a Model {
        self.model
    }

    /// Number of effective writes applied to the record so far.
    pub fn revision(&self) -> u64 {
        self.state.revision
    }

    /// Raw value of a field.
    pub fn get(&self, field: &str) -> Option<&'a FieldValue> {
        self.state.values.get(field)
    }

    /// Attribute value; `Null` when unset or when `field` is not an attribute.
    pub fn attr(&self, field: &str) -> &'a Value {
        self.get(field)
            .and_then(FieldValue::as_attribute)
            .unwrap_or(&NULL)
    }

    /// Record linked through a single-valued relation.
    pub fn one(&self, field: &str) -> Option<RecordView<'a>> {
        self.get(field)
            .and_then(FieldValue::as_one)
            .and_then(|id| self.manager.get(id))
    }

    /// Records linked through a multi-valued relation, in order.
    pub fn many(&self, field: &str) -> Vec<RecordView<'a>> {
        self.records(field)
            .map(|set| set.iter().filter_map(|id| self.manager.get(id)).collect())
            .unwrap_or_default()
    }

    /// Record set of a multi-valued relation.
    pub fn records(&self, field: &str) -> Option<&'a RecordSet> {
        self.get(field).and_then(FieldValue::as_many)
    }

    /// Call an instance method declared on the model.
    pub fn call(&self, method: &str) -> Option<FieldInput> {
        self.model.method(method).map(|m| m(self))
    }

    /// Snapshot of the record as a JSON object keyed by field name, plus
    /// `localId`. Relations render as local id strings.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("localId".into(), Value::String(self.state.id.to_string()));
        for field in self.model.fields() {
            let value = match self.get(&field.name) {
                Some(FieldValue::Attribute(v)) => v.clone(),
                Some(FieldValue::One(Some(id))) => Value::String(id.to_string()),
                Some(FieldValue::One(None)) | None => Value::Null,
                Some(FieldValue::Many(set)) => set
                    .iter()
                    .map(|id| Value::String(id.to_string()))
                    .collect(),
            };
            object.insert(field.name.clone(), value);
        }
        Value::Object(object)
    }
}

impl fmt::Debug for RecordView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordView")
            .field("local_id", &self.state.id)
            .field("revision", &self.state.revision)
            .finish()
    }
}

impl PartialEq for RecordView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.state.id == other.state.id
    }
}
