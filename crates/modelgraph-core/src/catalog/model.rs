//! Model declarations and patches.

use super::field::FieldDefinition;
use crate::command::FieldInput;
use crate::record::RecordView;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A model method: reads a record, returns the value for a field.
///
/// Compute methods must be pure functions of the record's declared
/// dependencies; they are re-run whenever one of them changes.
pub type Method = Arc<dyn Fn(&RecordView<'_>) -> FieldInput + Send + Sync>;

/// Declaration of one model.
#[derive(Clone)]
pub struct ModelDecl {
    /// Model name.
    pub name: String,
    /// Declared fields, in order.
    pub fields: Vec<FieldDefinition>,
    /// Methods by name.
    pub methods: BTreeMap<String, Method>,
    /// Attribute fields identifying a record; used to build local ids and
    /// by `insert` to find existing records.
    pub natural_key: Vec<String>,
}

impl ModelDecl {
    /// Create an empty declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            methods: BTreeMap::new(),
            natural_key: Vec::new(),
        }
    }

    /// Add a field.
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDefinition>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Add a method.
    pub fn with_method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&RecordView<'_>) -> FieldInput + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Set the natural key fields.
    pub fn with_natural_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natural_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Merge a patch: fields with a known name are reconciled, new ones
    /// appended; methods are overridden by name.
    pub(crate) fn apply_patch(&mut self, patch: ModelPatch) {
        for field in patch.fields {
            match self.fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => *existing = existing.reconcile(&field),
                None => self.fields.push(field),
            }
        }
        self.methods.extend(patch.methods);
    }
}

impl fmt::Debug for ModelDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDecl")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("natural_key", &self.natural_key)
            .finish()
    }
}

/// Extension of an already registered model, applied before `start()`.
#[derive(Clone)]
pub struct ModelPatch {
    /// Name of the patched model.
    pub model: String,
    /// Fields to add or reconcile.
    pub fields: Vec<FieldDefinition>,
    /// Methods to add or override.
    pub methods: BTreeMap<String, Method>,
}

impl ModelPatch {
    /// Create an empty patch for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fields: Vec::new(),
            methods: BTreeMap::new(),
        }
    }

    /// Add or reconcile a field.
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Add or override a method.
    pub fn with_method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&RecordView<'_>) -> FieldInput + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }
}

impl fmt::Debug for ModelPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelPatch")
            .field("model", &self.model)
            .field("fields", &self.fields)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
