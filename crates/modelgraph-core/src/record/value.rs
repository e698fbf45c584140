//! Stored field values.

use super::{LocalId, RecordSet};
use serde::Serialize;
use serde_json::Value;

/// Current value of one field on a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Attribute value. `Null` when unset.
    Attribute(Value),
    /// Single-valued relation (one2one, many2one).
    One(Option<LocalId>),
    /// Multi-valued relation (one2many, many2many).
    Many(RecordSet),
}

impl FieldValue {
    /// The attribute value, if this is an attribute.
    pub fn as_attribute(&self) -> Option<&Value> {
        match self {
            FieldValue::Attribute(v) => Some(v),
            _ => None,
        }
    }

    /// The linked record of a single-valued relation.
    pub fn as_one(&self) -> Option<&LocalId> {
        match self {
            FieldValue::One(r) => r.as_ref(),
            _ => None,
        }
    }

    /// The record set of a multi-valued relation.
    pub fn as_many(&self) -> Option<&RecordSet> {
        match self {
            FieldValue::Many(set) => Some(set),
            _ => None,
        }
    }

    /// Every linked record of a relation, in order. Empty for attributes.
    pub fn linked(&self) -> Vec<LocalId> {
        match self {
            FieldValue::Attribute(_) => Vec::new(),
            FieldValue::One(r) => r.iter().cloned().collect(),
            FieldValue::Many(set) => set.iter().cloned().collect(),
        }
    }
}
