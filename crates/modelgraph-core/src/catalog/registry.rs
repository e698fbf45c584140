//! Model registration, collected until the manager starts.

use super::field::FieldHash;
use super::model::{ModelDecl, ModelPatch};
use crate::error::ConfigError;
use std::collections::{BTreeSet, HashSet};

type Factory = Box<dyn FnOnce(&Declared<'_>) -> ModelDecl + Send + Sync>;

struct PendingModel {
    name: String,
    dependencies: Vec<String>,
    factory: Factory,
}

/// Models already built when a factory runs.
pub struct Declared<'a> {
    models: &'a [ModelDecl],
}

impl<'a> Declared<'a> {
    /// Get a built model declaration.
    pub fn get(&self, name: &str) -> Option<&'a ModelDecl> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Names of the built models, in build order.
    pub fn names(&self) -> impl Iterator<Item = &'a str> {
        self.models.iter().map(|m| m.name.as_str())
    }
}

/// Ordered list of model declarations and patches.
///
/// Nothing is resolved until [`build`](Self::build) runs at manager start:
/// factories are invoked in dependency order, each model's patches are merged
/// by field name right after it is built, and field hashes are assigned.
#[derive(Default)]
pub struct ModelRegistry {
    pending: Vec<PendingModel>,
    patches: Vec<ModelPatch>,
    expected: BTreeSet<String>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a model that depends on nothing.
    pub fn declare(&mut self, decl: ModelDecl) -> &mut Self {
        let name = decl.name.clone();
        self.register(name, Vec::<String>::new(), move |_| decl)
    }

    /// Register a model factory.
    ///
    /// The factory runs once every model in `dependencies` is built, and may
    /// read their declarations to compose its own fields.
    pub fn register<I, S, F>(&mut self, name: impl Into<String>, dependencies: I, factory: F) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&Declared<'_>) -> ModelDecl + Send + Sync + 'static,
    {
        self.pending.push(PendingModel {
            name: name.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            factory: Box::new(factory),
        });
        self
    }

    /// Patch a model's fields and methods.
    pub fn patch(&mut self, patch: ModelPatch) -> &mut Self {
        self.patches.push(patch);
        self
    }

    /// Require `names` to be registered before start succeeds.
    pub fn expect<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected.extend(names.into_iter().map(Into::into));
        self
    }

    /// Whether a model with this name has been registered.
    pub fn is_declared(&self, name: &str) -> bool {
        self.pending.iter().any(|p| p.name == name)
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Build every declaration, in dependency order.
    pub fn build(self) -> Result<Vec<ModelDecl>, ConfigError> {
        let mut names = HashSet::new();
        for pending in &self.pending {
            if !names.insert(pending.name.clone()) {
                return Err(ConfigError::DuplicateModel(pending.name.clone()));
            }
        }

        let missing: Vec<String> = self
            .expected
            .iter()
            .filter(|name| !names.contains(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingDeclarations(missing));
        }

        for pending in &self.pending {
            if let Some(dep) = pending.dependencies.iter().find(|d| !names.contains(*d)) {
                return Err(ConfigError::UnknownModel {
                    model: dep.clone(),
                    referenced_by: pending.name.clone(),
                });
            }
        }
        if let Some(patch) = self.patches.iter().find(|p| !names.contains(&p.model)) {
            return Err(ConfigError::UnknownModel {
                model: patch.model.clone(),
                referenced_by: "patch".to_string(),
            });
        }

        let mut patches = self.patches;
        let mut remaining = self.pending;
        let mut built: Vec<ModelDecl> = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let ready = remaining.iter().position(|p| {
                p.dependencies
                    .iter()
                    .all(|d| built.iter().any(|m| &m.name == d))
            });
            let Some(index) = ready else {
                let mut unresolved: Vec<String> =
                    remaining.into_iter().map(|p| p.name).collect();
                unresolved.sort();
                return Err(ConfigError::UnresolvedDependencies(unresolved));
            };

            let pending = remaining.remove(index);
            let mut decl = (pending.factory)(&Declared { models: &built });
            decl.name = pending.name;

            let mut ordinal = 0;
            assign_hashes(&decl.name, &mut decl.fields, &mut ordinal);

            let (own, rest): (Vec<_>, Vec<_>) =
                patches.into_iter().partition(|p| p.model == decl.name);
            patches = rest;
            let patched = own.len();
            for mut patch in own {
                assign_hashes(&decl.name, &mut patch.fields, &mut ordinal);
                decl.apply_patch(patch);
            }

            tracing::debug!(
                model = %decl.name,
                fields = decl.fields.len(),
                patches = patched,
                "model built"
            );
            built.push(decl);
        }

        Ok(built)
    }
}

fn assign_hashes(model: &str, fields: &mut [super::FieldDefinition], ordinal: &mut usize) {
    for field in fields {
        if field.hashes.is_empty() {
            field.hashes.push(FieldHash::derive(model, &field.name, *ordinal));
        }
        *ordinal += 1;
    }
}
