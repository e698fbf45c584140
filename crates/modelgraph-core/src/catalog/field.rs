//! Field definitions for models.

use serde_json::Value;
use std::fmt;

/// Shape of a relation between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// One record on each side.
    OneToOne,
    /// Many records here, one on the inverse side.
    OneToMany,
    /// One record here, many on the inverse side.
    ManyToOne,
    /// Many records on each side.
    ManyToMany,
}

impl RelationType {
    /// Whether this side holds several records.
    pub fn is_x2many(self) -> bool {
        matches!(self, RelationType::OneToMany | RelationType::ManyToMany)
    }

    /// The relation type the inverse field must have.
    pub fn inverse(self) -> RelationType {
        match self {
            RelationType::OneToOne => RelationType::OneToOne,
            RelationType::OneToMany => RelationType::ManyToOne,
            RelationType::ManyToOne => RelationType::OneToMany,
            RelationType::ManyToMany => RelationType::ManyToMany,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationType::OneToOne => "one2one",
            RelationType::OneToMany => "one2many",
            RelationType::ManyToOne => "many2one",
            RelationType::ManyToMany => "many2many",
        };
        f.write_str(name)
    }
}

/// Kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Holds a JSON-safe value.
    Attribute,
    /// Refers to records of another model.
    Relation(RelationType),
}

/// Identity hash of a field declaration.
///
/// Dependents are keyed by hash rather than by name so that a field only
/// gets invalidated by dependencies it actually declared, including those
/// merged in through [`FieldDefinition::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldHash(String);

impl FieldHash {
    /// Derive the hash of the `ordinal`-th declaration of `model.field`.
    pub fn derive(model: &str, field: &str, ordinal: usize) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(model.as_bytes());
        hasher.update(&[0]);
        hasher.update(field.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(ordinal as u64).to_le_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest.as_bytes()[..8]))
    }

    /// Hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A field declared on a model.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Field name.
    pub name: String,
    /// Attribute or relation.
    pub kind: FieldKind,
    /// Target model (relations only).
    pub to: Option<String>,
    /// Name of the inverse field on the target model (relations only).
    pub inverse: Option<String>,
    /// Value installed on creation (attributes only).
    pub default: Option<Value>,
    /// Name of the model method producing this field's value.
    pub compute: Option<String>,
    /// `relation.field` path this field mirrors.
    pub related: Option<String>,
    /// Fields whose change triggers recomputation. `a` names a field of the
    /// same record, `rel.b` a field of the records linked through `rel`.
    pub dependencies: Vec<String>,
    /// Linked records are owned by this record.
    pub is_causal: bool,
    /// Create and link a target record when the owner is created.
    pub autocreate: bool,
    /// Identity hashes, assigned at registration and merged on reconcile.
    pub hashes: Vec<FieldHash>,
}

impl FieldDefinition {
    fn base(name: impl Into<String>, kind: FieldKind, to: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            to,
            inverse: None,
            default: None,
            compute: None,
            related: None,
            dependencies: Vec::new(),
            is_causal: false,
            autocreate: false,
            hashes: Vec::new(),
        }
    }

    fn relation(name: impl Into<String>, to: impl Into<String>, rel: RelationType) -> Self {
        Self::base(name, FieldKind::Relation(rel), Some(to.into()))
    }

    /// Declare an attribute field.
    pub fn attr(name: impl Into<String>) -> Self {
        Self::base(name, FieldKind::Attribute, None)
    }

    /// Declare a one2one relation.
    pub fn one2one(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self::relation(name, to, RelationType::OneToOne)
    }

    /// Declare a one2many relation.
    pub fn one2many(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self::relation(name, to, RelationType::OneToMany)
    }

    /// Declare a many2one relation.
    pub fn many2one(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self::relation(name, to, RelationType::ManyToOne)
    }

    /// Declare a many2many relation.
    pub fn many2many(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self::relation(name, to, RelationType::ManyToMany)
    }

    /// Set the inverse field name.
    pub fn inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    /// Set the default value.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Compute this field with `method`, re-run when `dependencies` change.
    pub fn compute<I, S>(mut self, method: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compute = Some(method.into());
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Mirror `relation.field`.
    pub fn related(mut self, path: impl Into<String>) -> Self {
        self.related = Some(path.into());
        self
    }

    /// Mark the relation as owning its targets.
    pub fn causal(mut self) -> Self {
        self.is_causal = true;
        self
    }

    /// Auto-create a linked target record on creation.
    pub fn autocreate(mut self) -> Self {
        self.autocreate = true;
        self
    }

    /// Relation type, if this is a relation.
    pub fn relation_type(&self) -> Option<RelationType> {
        match self.kind {
            FieldKind::Relation(rel) => Some(rel),
            FieldKind::Attribute => None,
        }
    }

    /// Whether this is a relation field.
    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::Relation(_))
    }

    /// Whether this relation holds several records.
    pub fn is_x2many(&self) -> bool {
        self.relation_type().is_some_and(RelationType::is_x2many)
    }

    /// Whether the value is derived (computed or related).
    pub fn is_computed(&self) -> bool {
        self.compute.is_some() || self.related.is_some()
    }

    /// `related` split into relation name and far field name.
    pub fn related_path(&self) -> Option<(&str, &str)> {
        self.related.as_deref().and_then(|path| path.split_once('.'))
    }

    /// Primary identity hash.
    pub fn primary_hash(&self) -> Option<&FieldHash> {
        self.hashes.first()
    }

    /// Whether this definition carries `hash`.
    pub fn has_hash(&self, hash: &FieldHash) -> bool {
        self.hashes.contains(hash)
    }

    /// Merge a later declaration of the same field into this one.
    ///
    /// The result keeps this definition's properties, fills properties left
    /// unset here from `other`, and takes the union of both dependency lists
    /// and hash sets.
    pub fn reconcile(&self, other: &FieldDefinition) -> FieldDefinition {
        let mut merged = self.clone();
        merged.to = merged.to.or_else(|| other.to.clone());
        merged.inverse = merged.inverse.or_else(|| other.inverse.clone());
        merged.default = merged.default.or_else(|| other.default.clone());
        merged.compute = merged.compute.or_else(|| other.compute.clone());
        merged.related = merged.related.or_else(|| other.related.clone());
        merged.is_causal |= other.is_causal;
        merged.autocreate |= other.autocreate;
        for dep in &other.dependencies {
            if !merged.dependencies.contains(dep) {
                merged.dependencies.push(dep.clone());
            }
        }
        for hash in &other.hashes {
            if !merged.hashes.contains(hash) {
                merged.hashes.push(hash.clone());
            }
        }
        merged
    }
}
