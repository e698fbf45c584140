//! Frozen schema: every model resolved and validated.

use super::field::{FieldDefinition, FieldHash, FieldKind};
use super::model::{Method, ModelDecl};
use crate::error::ConfigError;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A field to invalidate when another field changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependent {
    /// Hash the dependent field must carry to be invalidated.
    pub hash: FieldHash,
    /// Relation on the changed record leading to the dependent records;
    /// `None` when the dependent lives on the changed record itself.
    pub via: Option<String>,
    /// Name of the dependent field.
    pub field: String,
}

/// A resolved model.
pub struct Model {
    name: String,
    fields: Vec<FieldDefinition>,
    index: HashMap<String, usize>,
    methods: BTreeMap<String, Method>,
    natural_key: Vec<String>,
    dependents: HashMap<String, Vec<Dependent>>,
    compute_order: Vec<String>,
    compute_rank: HashMap<String, usize>,
    causal_owner_fields: Vec<String>,
}

impl Model {
    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter()
    }

    /// Relation fields in declaration order.
    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.is_relation())
    }

    /// Get a method by name.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Natural key fields.
    pub fn natural_key(&self) -> &[String] {
        &self.natural_key
    }

    /// Fields to invalidate when `field` changes.
    pub fn dependents(&self, field: &str) -> &[Dependent] {
        self.dependents.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Computed and related fields, dependencies first.
    pub fn compute_order(&self) -> &[String] {
        &self.compute_order
    }

    /// Position of a computed field in [`compute_order`](Self::compute_order).
    pub fn compute_rank(&self, field: &str) -> usize {
        self.compute_rank.get(field).copied().unwrap_or(usize::MAX)
    }

    /// Fields of this model through which an owner holds it causally.
    pub fn causal_owner_fields(&self) -> &[String] {
        &self.causal_owner_fields
    }
}

/// Every model of the application, frozen at start.
pub struct Schema {
    models: HashMap<String, Model>,
    order: Vec<String>,
    computed_fields: usize,
}

impl Schema {
    /// Resolve and validate declarations.
    pub fn build(mut decls: Vec<ModelDecl>) -> Result<Self, ConfigError> {
        for decl in &mut decls {
            for (i, field) in decl.fields.iter_mut().enumerate() {
                if field.hashes.is_empty() {
                    field.hashes.push(FieldHash::derive(&decl.name, &field.name, i));
                }
            }
        }

        let mut by_name: HashMap<&str, &ModelDecl> = HashMap::new();
        for decl in &decls {
            if by_name.insert(decl.name.as_str(), decl).is_some() {
                return Err(ConfigError::DuplicateModel(decl.name.clone()));
            }
            let mut seen = HashSet::new();
            for field in &decl.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(ConfigError::DuplicateField {
                        model: decl.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }

        let mut dependents: HashMap<(String, String), Vec<Dependent>> = HashMap::new();
        let mut owner_fields: HashMap<String, Vec<String>> = HashMap::new();
        let mut orders: HashMap<String, Vec<String>> = HashMap::new();
        let mut computed_fields = 0;

        for decl in &decls {
            for field in &decl.fields {
                validate_field(decl, field, &by_name)?;

                if field.is_causal {
                    if let (Some(to), Some(inverse)) = (&field.to, &field.inverse) {
                        owner_fields
                            .entry(to.clone())
                            .or_default()
                            .push(inverse.clone());
                    }
                }

                if field.is_computed() {
                    computed_fields += 1;
                    register_dependents(decl, field, &by_name, &mut dependents)?;
                }
            }

            for key in &decl.natural_key {
                match decl.get_field(key) {
                    Some(f) if f.kind == FieldKind::Attribute && !f.is_computed() => {}
                    _ => {
                        return Err(ConfigError::InvalidNaturalKey {
                            model: decl.name.clone(),
                            field: key.clone(),
                        })
                    }
                }
            }

            orders.insert(decl.name.clone(), compute_order(decl)?);
        }

        let mut models = HashMap::with_capacity(decls.len());
        let mut order = Vec::with_capacity(decls.len());
        for decl in decls {
            let index = decl
                .fields
                .iter()
                .enumerate()
                .map(|(i, f)| (f.name.clone(), i))
                .collect();
            let model_dependents = decl
                .fields
                .iter()
                .filter_map(|f| {
                    dependents
                        .remove(&(decl.name.clone(), f.name.clone()))
                        .map(|deps| (f.name.clone(), deps))
                })
                .collect();
            let compute_order = orders.remove(&decl.name).unwrap_or_default();
            let compute_rank = compute_order
                .iter()
                .enumerate()
                .map(|(i, f)| (f.clone(), i))
                .collect();

            order.push(decl.name.clone());
            models.insert(
                decl.name.clone(),
                Model {
                    causal_owner_fields: owner_fields.remove(&decl.name).unwrap_or_default(),
                    name: decl.name,
                    fields: decl.fields,
                    index,
                    methods: decl.methods,
                    natural_key: decl.natural_key,
                    dependents: model_dependents,
                    compute_order,
                    compute_rank,
                },
            );
        }

        Ok(Self {
            models,
            order,
            computed_fields,
        })
    }

    /// Get a model by name.
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// Models in build order.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.order.iter().filter_map(|name| self.models.get(name))
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether there are no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Number of computed and related fields across all models.
    pub fn computed_field_count(&self) -> usize {
        self.computed_fields
    }

    /// Number of fields across all models.
    pub fn field_count(&self) -> usize {
        self.models.values().map(|m| m.fields.len()).sum()
    }
}

fn invalid(decl: &ModelDecl, field: &FieldDefinition, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidField {
        model: decl.name.clone(),
        field: field.name.clone(),
        reason: reason.into(),
    }
}

fn validate_field(
    decl: &ModelDecl,
    field: &FieldDefinition,
    by_name: &HashMap<&str, &ModelDecl>,
) -> Result<(), ConfigError> {
    if field.compute.is_some() && field.related.is_some() {
        return Err(invalid(decl, field, "cannot be both computed and related"));
    }
    if let Some(method) = &field.compute {
        if !decl.methods.contains_key(method) {
            return Err(ConfigError::UnknownComputeMethod {
                model: decl.name.clone(),
                field: field.name.clone(),
                method: method.clone(),
            });
        }
    }

    match field.kind {
        FieldKind::Attribute => {
            if field.to.is_some() || field.inverse.is_some() {
                return Err(invalid(decl, field, "attributes have no target or inverse"));
            }
            if field.is_causal || field.autocreate {
                return Err(invalid(decl, field, "only relations can be causal or autocreate"));
            }
        }
        FieldKind::Relation(rel) => {
            if field.default.is_some() {
                return Err(invalid(decl, field, "relations take no default value"));
            }
            let to = field
                .to
                .as_deref()
                .ok_or_else(|| invalid(decl, field, "relation without target model"))?;
            let target = by_name.get(to).ok_or_else(|| ConfigError::UnknownModel {
                model: to.to_string(),
                referenced_by: format!("{}.{}", decl.name, field.name),
            })?;
            let missing = || ConfigError::MissingInverse {
                model: decl.name.clone(),
                field: field.name.clone(),
                to: to.to_string(),
                inverse: field.inverse.clone(),
            };
            let inverse_name = field.inverse.as_deref().ok_or_else(missing)?;
            let inverse = target.get_field(inverse_name).ok_or_else(missing)?;
            let mismatch = |reason: String| ConfigError::InverseMismatch {
                model: decl.name.clone(),
                field: field.name.clone(),
                to: to.to_string(),
                inverse: inverse_name.to_string(),
                reason,
            };
            let Some(inverse_rel) = inverse.relation_type() else {
                return Err(mismatch("inverse is an attribute".into()));
            };
            if inverse.to.as_deref() != Some(decl.name.as_str()) {
                return Err(mismatch(format!("inverse targets {:?}", inverse.to)));
            }
            if inverse.inverse.as_deref() != Some(field.name.as_str()) {
                return Err(mismatch(format!(
                    "inverse declares its own inverse as {:?}",
                    inverse.inverse
                )));
            }
            if inverse_rel != rel.inverse() {
                return Err(mismatch(format!(
                    "{} requires a {} inverse, found {}",
                    rel,
                    rel.inverse(),
                    inverse_rel
                )));
            }
        }
    }

    if let Some(path) = &field.related {
        validate_related(decl, field, path, by_name)?;
    }
    Ok(())
}

fn validate_related(
    decl: &ModelDecl,
    field: &FieldDefinition,
    path: &str,
    by_name: &HashMap<&str, &ModelDecl>,
) -> Result<(), ConfigError> {
    let fail = |reason: &str| ConfigError::InvalidRelated {
        model: decl.name.clone(),
        field: field.name.clone(),
        path: path.to_string(),
        reason: reason.to_string(),
    };
    let (relation_name, far_name) = field
        .related_path()
        .ok_or_else(|| fail("expected `relation.field`"))?;
    let relation = decl
        .get_field(relation_name)
        .ok_or_else(|| fail("unknown relation"))?;
    let target = relation
        .to
        .as_deref()
        .and_then(|to| by_name.get(to))
        .ok_or_else(|| fail("first segment is not a relation"))?;
    let far = target
        .get_field(far_name)
        .ok_or_else(|| fail("unknown field on the related model"))?;

    match field.kind {
        FieldKind::Attribute => {
            if far.is_relation() {
                return Err(fail("an attribute cannot mirror a relation"));
            }
        }
        FieldKind::Relation(_) => {
            if !far.is_relation() || far.to != field.to {
                return Err(fail("mirrored field must be a relation to the same model"));
            }
            if !field.is_x2many() && (relation.is_x2many() || far.is_x2many()) {
                return Err(fail("a single-valued field cannot mirror several records"));
            }
        }
    }
    Ok(())
}

/// Effective dependencies: declared ones plus those implied by `related`.
fn effective_dependencies(field: &FieldDefinition) -> Vec<String> {
    let mut deps = field.dependencies.clone();
    if let (Some(path), Some((relation, _))) = (&field.related, field.related_path()) {
        for implied in [relation.to_string(), path.clone()] {
            if !deps.contains(&implied) {
                deps.push(implied);
            }
        }
    }
    deps
}

fn register_dependents(
    decl: &ModelDecl,
    field: &FieldDefinition,
    by_name: &HashMap<&str, &ModelDecl>,
    dependents: &mut HashMap<(String, String), Vec<Dependent>>,
) -> Result<(), ConfigError> {
    let unknown = |dependency: &str| ConfigError::UnknownDependency {
        model: decl.name.clone(),
        field: field.name.clone(),
        dependency: dependency.to_string(),
    };
    let Some(hash) = field.primary_hash().cloned() else {
        return Ok(());
    };
    let mut push = |model: &str, on: &str, dependent: Dependent| {
        let list = dependents
            .entry((model.to_string(), on.to_string()))
            .or_default();
        if !list.contains(&dependent) {
            list.push(dependent);
        }
    };

    for dependency in effective_dependencies(field) {
        match dependency.split_once('.') {
            None => {
                if decl.get_field(&dependency).is_none() {
                    return Err(unknown(&dependency));
                }
                push(
                    &decl.name,
                    &dependency,
                    Dependent {
                        hash: hash.clone(),
                        via: None,
                        field: field.name.clone(),
                    },
                );
            }
            Some((relation_name, far_name)) => {
                let relation = decl
                    .get_field(relation_name)
                    .filter(|f| f.is_relation())
                    .ok_or_else(|| unknown(&dependency))?;
                let (Some(to), Some(inverse)) = (&relation.to, &relation.inverse) else {
                    return Err(unknown(&dependency));
                };
                let target = by_name.get(to.as_str()).ok_or_else(|| unknown(&dependency))?;
                if target.get_field(far_name).is_none() {
                    return Err(unknown(&dependency));
                }
                push(
                    to,
                    far_name,
                    Dependent {
                        hash: hash.clone(),
                        via: Some(inverse.clone()),
                        field: field.name.clone(),
                    },
                );
                push(
                    &decl.name,
                    relation_name,
                    Dependent {
                        hash: hash.clone(),
                        via: None,
                        field: field.name.clone(),
                    },
                );
            }
        }
    }
    Ok(())
}

/// Order the computed fields of a model so that a field comes after the
/// computed fields of the same record it depends on.
fn compute_order(decl: &ModelDecl) -> Result<Vec<String>, ConfigError> {
    let computed: Vec<&FieldDefinition> = decl.fields.iter().filter(|f| f.is_computed()).collect();
    let computed_names: HashSet<&str> = computed.iter().map(|f| f.name.as_str()).collect();

    let local_deps: HashMap<&str, Vec<String>> = computed
        .iter()
        .map(|f| {
            let deps = effective_dependencies(f)
                .into_iter()
                .map(|d| match d.split_once('.') {
                    Some((relation, _)) => relation.to_string(),
                    None => d,
                })
                .filter(|d| computed_names.contains(d.as_str()))
                .collect();
            (f.name.as_str(), deps)
        })
        .collect();

    let mut placed: Vec<String> = Vec::with_capacity(computed.len());
    let mut remaining: Vec<&FieldDefinition> = computed;
    while !remaining.is_empty() {
        let next = remaining.iter().position(|f| {
            local_deps[f.name.as_str()]
                .iter()
                .all(|d| placed.contains(d))
        });
        match next {
            Some(i) => placed.push(remaining.remove(i).name.clone()),
            None => {
                return Err(ConfigError::DependencyCycle {
                    model: decl.name.clone(),
                    fields: remaining.iter().map(|f| f.name.clone()).collect(),
                })
            }
        }
    }
    Ok(placed)
}
