//! Create/update payloads and relation commands.

use crate::error::CommandError;
use crate::record::{LocalId, RecordSet};
use serde_json::Value;

/// A single record or a list of records (or record data).
///
/// `Many` is rejected by single-valued relations even when it holds one
/// element: an array handed to a one relation is an arity mismatch.
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    /// One item.
    One(T),
    /// A list of items.
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Whether this is the list form.
    pub fn is_many(&self) -> bool {
        matches!(self, OneOrMany::Many(_))
    }

    /// Flatten into a vector.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    /// Borrow the items as a slice.
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item),
            OneOrMany::Many(items) => items,
        }
    }
}

impl From<LocalId> for OneOrMany<LocalId> {
    fn from(id: LocalId) -> Self {
        OneOrMany::One(id)
    }
}

impl From<&LocalId> for OneOrMany<LocalId> {
    fn from(id: &LocalId) -> Self {
        OneOrMany::One(id.clone())
    }
}

impl From<Vec<LocalId>> for OneOrMany<LocalId> {
    fn from(ids: Vec<LocalId>) -> Self {
        OneOrMany::Many(ids)
    }
}

impl From<&RecordSet> for OneOrMany<LocalId> {
    fn from(set: &RecordSet) -> Self {
        OneOrMany::Many(set.iter().cloned().collect())
    }
}

impl From<Data> for OneOrMany<Data> {
    fn from(data: Data) -> Self {
        OneOrMany::One(data)
    }
}

impl From<Vec<Data>> for OneOrMany<Data> {
    fn from(data: Vec<Data>) -> Self {
        OneOrMany::Many(data)
    }
}

/// Instruction describing how to mutate a relation field.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationCommand {
    /// Add to a many relation, or set a one relation (unlinking the
    /// previous value first).
    Link(OneOrMany<LocalId>),
    /// Remove from a many relation, or clear a one relation.
    Unlink(OneOrMany<LocalId>),
    /// Find-or-create by natural key, then link.
    Insert(OneOrMany<Data>),
    /// Find-or-create by natural key, then replace the whole value.
    InsertAndReplace(OneOrMany<Data>),
    /// Always create new target records, then link.
    Create(OneOrMany<Data>),
    /// Make the relation hold exactly these records.
    Replace(OneOrMany<LocalId>),
    /// Clear every linked record.
    UnlinkAll,
}

impl RelationCommand {
    /// Command verb, as used in error messages.
    pub fn verb(&self) -> &'static str {
        match self {
            RelationCommand::Link(_) => "link",
            RelationCommand::Unlink(_) => "unlink",
            RelationCommand::Insert(_) => "insert",
            RelationCommand::InsertAndReplace(_) => "insert-and-replace",
            RelationCommand::Create(_) => "create",
            RelationCommand::Replace(_) => "replace",
            RelationCommand::UnlinkAll => "unlink-all",
        }
    }

    /// Whether the payload is in list form.
    pub fn is_many(&self) -> bool {
        match self {
            RelationCommand::Link(v) | RelationCommand::Unlink(v) | RelationCommand::Replace(v) => {
                v.is_many()
            }
            RelationCommand::Insert(v)
            | RelationCommand::InsertAndReplace(v)
            | RelationCommand::Create(v) => v.is_many(),
            RelationCommand::UnlinkAll => false,
        }
    }
}

/// The value supplied for one field in create/update data.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldInput {
    /// Plain value. Written directly to attributes; on relations an object
    /// (or array of objects) is sugar for `InsertAndReplace` and `null`
    /// for `UnlinkAll`.
    Value(Value),
    /// Relation commands, applied in order.
    Commands(Vec<RelationCommand>),
}

impl FieldInput {
    /// A plain value.
    pub fn value(value: impl Into<Value>) -> Self {
        FieldInput::Value(value.into())
    }

    /// A single relation command.
    pub fn command(command: RelationCommand) -> Self {
        FieldInput::Commands(vec![command])
    }

    /// No-op input: an empty command list.
    pub fn none() -> Self {
        FieldInput::Commands(Vec::new())
    }
}

impl From<Value> for FieldInput {
    fn from(value: Value) -> Self {
        FieldInput::Value(value)
    }
}

impl From<RelationCommand> for FieldInput {
    fn from(command: RelationCommand) -> Self {
        FieldInput::command(command)
    }
}

impl From<Vec<RelationCommand>> for FieldInput {
    fn from(commands: Vec<RelationCommand>) -> Self {
        FieldInput::Commands(commands)
    }
}

/// Ordered field assignments for `create`, `insert` and `update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data {
    entries: Vec<(String, FieldInput)>,
}

impl Data {
    /// Empty data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a JSON object; every key becomes a plain value input.
    pub fn from_json(value: Value) -> Result<Self, CommandError> {
        match value {
            Value::Object(map) => Ok(Self {
                entries: map
                    .into_iter()
                    .map(|(k, v)| (k, FieldInput::Value(v)))
                    .collect(),
            }),
            other => Err(CommandError::NotAnObject(other.to_string())),
        }
    }

    /// Set a field input, replacing any earlier one for the same field.
    pub fn with(mut self, field: impl Into<String>, input: impl Into<FieldInput>) -> Self {
        let field = field.into();
        let input = input.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = input,
            None => self.entries.push((field, input)),
        }
        self
    }

    /// Set a plain value.
    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, FieldInput::Value(value.into()))
    }

    /// Append a relation command to a field, after any earlier commands.
    pub fn command(mut self, field: impl Into<String>, command: RelationCommand) -> Self {
        let field = field.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some((_, FieldInput::Commands(commands))) => commands.push(command),
            Some(entry) => entry.1 = FieldInput::command(command),
            None => self.entries.push((field, FieldInput::command(command))),
        }
        self
    }

    /// Append a `link` command.
    pub fn link(self, field: impl Into<String>, records: impl Into<OneOrMany<LocalId>>) -> Self {
        self.command(field, RelationCommand::Link(records.into()))
    }

    /// Append an `unlink` command.
    pub fn unlink(self, field: impl Into<String>, records: impl Into<OneOrMany<LocalId>>) -> Self {
        self.command(field, RelationCommand::Unlink(records.into()))
    }

    /// Append a `replace` command.
    pub fn replace(self, field: impl Into<String>, records: impl Into<OneOrMany<LocalId>>) -> Self {
        self.command(field, RelationCommand::Replace(records.into()))
    }

    /// Append an `insert` command.
    pub fn insert(self, field: impl Into<String>, data: impl Into<OneOrMany<Data>>) -> Self {
        self.command(field, RelationCommand::Insert(data.into()))
    }

    /// Append an `insert-and-replace` command.
    pub fn insert_and_replace(
        self,
        field: impl Into<String>,
        data: impl Into<OneOrMany<Data>>,
    ) -> Self {
        self.command(field, RelationCommand::InsertAndReplace(data.into()))
    }

    /// Append a `create` command.
    pub fn create(self, field: impl Into<String>, data: impl Into<OneOrMany<Data>>) -> Self {
        self.command(field, RelationCommand::Create(data.into()))
    }

    /// Append an `unlink-all` command.
    pub fn unlink_all(self, field: impl Into<String>) -> Self {
        self.command(field, RelationCommand::UnlinkAll)
    }

    /// Input for a field.
    pub fn get(&self, field: &str) -> Option<&FieldInput> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, input)| input)
    }

    /// Plain value supplied for a field.
    pub fn value(&self, field: &str) -> Option<&Value> {
        match self.get(field) {
            Some(FieldInput::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Whether the field is present.
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldInput)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Data {
    type Item = (String, FieldInput);
    type IntoIter = std::vec::IntoIter<(String, FieldInput)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl TryFrom<Value> for Data {
    type Error = CommandError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Data::from_json(value)
    }
}
