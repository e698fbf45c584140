//! The model manager: owner of the live record graph.
//!
//! Every mutation goes through a public operation (`create`, `insert`,
//! `update`, `delete`). Each one applies its writes, then collects records
//! left without a causal owner and drains the dirty queue until no computed
//! field remains stale, and finally delivers coalesced change events to
//! observers. Reads never observe a half-applied operation.

mod cascade;
mod compute;
mod relation;

use crate::catalog::{
    Declared, FieldDefinition, FieldKind, Model, ModelDecl, ModelPatch, ModelRegistry, Schema,
};
use crate::command::{Data, FieldInput, RelationCommand};
use crate::config::ManagerConfig;
use crate::error::{CommandError, Error, Result};
use crate::observer::{ChangeEvent, ObserverId, Observers};
use crate::record::{key_component, FieldValue, LocalId, RecordSet, RecordView};
use compute::DirtyQueue;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Stored state of one live record.
#[derive(Debug, Clone)]
pub(crate) struct RecordState {
    pub(crate) id: LocalId,
    pub(crate) values: HashMap<String, FieldValue>,
    pub(crate) revision: u64,
}

/// Counters describing the manager's work so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Live records.
    pub records: usize,
    /// Compute and related evaluations run.
    pub computations: u64,
    /// Stabilization passes run.
    pub passes: u64,
}

/// Owner of every record of every model.
pub struct ModelManager {
    config: ManagerConfig,
    registry: Option<ModelRegistry>,
    schema: Option<Arc<Schema>>,
    records: HashMap<LocalId, RecordState>,
    by_model: HashMap<String, Vec<LocalId>>,
    tombstones: HashSet<LocalId>,
    sequence: u64,
    dirty: DirtyQueue,
    orphans: Vec<LocalId>,
    observers: Observers,
    computations: u64,
    passes: u64,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new(ModelRegistry::new())
    }
}

impl ModelManager {
    /// Create a manager with the default configuration.
    pub fn new(registry: ModelRegistry) -> Self {
        Self::with_config(registry, ManagerConfig::default())
    }

    /// Create a manager with a custom configuration.
    pub fn with_config(registry: ModelRegistry, config: ManagerConfig) -> Self {
        Self {
            config,
            registry: Some(registry),
            schema: None,
            records: HashMap::new(),
            by_model: HashMap::new(),
            tombstones: HashSet::new(),
            sequence: 0,
            dirty: DirtyQueue::default(),
            orphans: Vec::new(),
            observers: Observers::default(),
            computations: 0,
            passes: 0,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn registry_mut(&mut self) -> Result<&mut ModelRegistry> {
        self.registry.as_mut().ok_or(Error::AlreadyStarted)
    }

    /// Declare a model. Only allowed before `start()`.
    pub fn declare(&mut self, decl: ModelDecl) -> Result<()> {
        self.registry_mut()?.declare(decl);
        Ok(())
    }

    /// Register a model factory. Only allowed before `start()`.
    pub fn register<I, S, F>(&mut self, name: impl Into<String>, dependencies: I, factory: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&Declared<'_>) -> ModelDecl + Send + Sync + 'static,
    {
        self.registry_mut()?.register(name, dependencies, factory);
        Ok(())
    }

    /// Patch a registered model. Only allowed before `start()`.
    pub fn patch(&mut self, patch: ModelPatch) -> Result<()> {
        self.registry_mut()?.patch(patch);
        Ok(())
    }

    /// Require models to be registered before `start()` succeeds.
    pub fn expect<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry_mut()?.expect(names);
        Ok(())
    }

    /// Freeze the registry: build every declaration, resolve inverses and
    /// validate the schema.
    ///
    /// On failure the manager returns to the declaring state with an empty
    /// registry.
    pub fn start(&mut self) -> Result<()> {
        let registry = self.registry.take().ok_or(Error::AlreadyStarted)?;
        let schema = match registry.build().and_then(Schema::build) {
            Ok(schema) => schema,
            Err(e) => {
                tracing::error!(error = %e, "model schema rejected");
                self.registry = Some(ModelRegistry::new());
                return Err(e.into());
            }
        };

        tracing::info!(
            models = schema.len(),
            fields = schema.field_count(),
            computed = schema.computed_field_count(),
            "model manager started"
        );
        self.schema = Some(Arc::new(schema));
        Ok(())
    }

    /// Whether `start()` has completed.
    pub fn is_started(&self) -> bool {
        self.schema.is_some()
    }

    /// Drop every record and the frozen schema, returning to the declaring
    /// state. Subscriptions are kept.
    pub fn teardown(&mut self) {
        let records = self.records.len();
        self.records.clear();
        self.by_model.clear();
        self.tombstones.clear();
        self.sequence = 0;
        self.dirty.clear();
        self.orphans.clear();
        self.observers.discard();
        self.computations = 0;
        self.passes = 0;
        self.schema = None;
        self.registry = Some(ModelRegistry::new());
        tracing::info!(records, "model manager torn down");
    }

    /// The frozen schema, once started.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    fn frozen(&self) -> Result<Arc<Schema>> {
        self.schema.clone().ok_or(Error::NotStarted)
    }

    /// Work counters.
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            records: self.records.len(),
            computations: self.computations,
            passes: self.passes,
        }
    }

    /// Subscribe to record changes, optionally only those of `model`.
    pub fn subscribe<F>(&mut self, model: Option<&str>, callback: F) -> ObserverId
    where
        F: FnMut(&ChangeEvent) + Send + Sync + 'static,
    {
        self.observers
            .subscribe(model.map(String::from), Box::new(callback))
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ---------------------------------------------------------------------
    // Public mutations
    // ---------------------------------------------------------------------

    /// Create a record of `model`.
    ///
    /// Defaults are installed, `autocreate` relations absent from `data` get
    /// a fresh linked record, attributes are written, then relation commands
    /// run in the order given, then every computed field is evaluated.
    pub fn create(&mut self, model: &str, data: Data) -> Result<LocalId> {
        self.run(|manager, schema| manager.create_record(schema, model, data))
    }

    /// Find the record of `model` matching the natural key in `data` and
    /// update it, or create it when absent.
    pub fn insert(&mut self, model: &str, data: Data) -> Result<LocalId> {
        self.run(|manager, schema| manager.insert_record(schema, model, data))
    }

    /// Apply attribute writes and relation commands to an existing record.
    pub fn update(&mut self, id: &LocalId, data: Data) -> Result<()> {
        self.run(|manager, schema| manager.update_record(schema, id, data))
    }

    /// Delete a record and every record it exclusively owns through causal
    /// relations.
    pub fn delete(&mut self, id: &LocalId) -> Result<()> {
        self.run(|manager, schema| manager.delete_record(schema, id))
    }

    /// Run one outermost operation, then settle the graph and notify.
    fn run<T>(&mut self, op: impl FnOnce(&mut Self, &Schema) -> Result<T>) -> Result<T> {
        let schema = self.frozen()?;
        let outcome = op(self, schema.as_ref());
        let settled = self.settle(schema.as_ref());
        self.observers.flush();
        let value = outcome?;
        settled?;
        Ok(value)
    }

    fn settle(&mut self, schema: &Schema) -> Result<()> {
        let result = self.stabilize(schema);
        if result.is_err() {
            self.dirty.clear();
            self.orphans.clear();
        }
        result
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// View of a live record.
    pub fn get(&self, id: &LocalId) -> Option<RecordView<'_>> {
        let state = self.records.get(id)?;
        let model = self.schema.as_deref()?.model(id.model())?;
        Some(RecordView::new(self, state, model))
    }

    /// View of a live record, failing with a distinguishable error when it
    /// has been deleted.
    pub fn record(&self, id: &LocalId) -> Result<RecordView<'_>> {
        self.ensure_alive(id)?;
        self.get(id).ok_or_else(|| Error::RecordNotFound(id.clone()))
    }

    /// Whether the record is alive.
    pub fn exists(&self, id: &LocalId) -> bool {
        self.records.contains_key(id)
    }

    /// First record of `model`, in insertion order, matching `predicate`.
    pub fn find<P>(&self, model: &str, mut predicate: P) -> Option<RecordView<'_>>
    where
        P: FnMut(&RecordView<'_>) -> bool,
    {
        self.views(model).find(|view| predicate(view))
    }

    /// Every record of `model` matching `predicate`, in insertion order.
    pub fn all<P>(&self, model: &str, mut predicate: P) -> Vec<RecordView<'_>>
    where
        P: FnMut(&RecordView<'_>) -> bool,
    {
        self.views(model).filter(|view| predicate(view)).collect()
    }

    fn views<'a>(&'a self, model: &str) -> impl Iterator<Item = RecordView<'a>> + 'a {
        self.by_model
            .get(model)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.get(id))
    }

    fn ensure_alive(&self, id: &LocalId) -> Result<()> {
        if self.records.contains_key(id) {
            Ok(())
        } else if self.tombstones.contains(id) {
            Err(Error::RecordDeleted(id.clone()))
        } else {
            Err(Error::RecordNotFound(id.clone()))
        }
    }

    // ---------------------------------------------------------------------
    // Record lifecycle
    // ---------------------------------------------------------------------

    fn create_record(&mut self, schema: &Schema, model_name: &str, data: Data) -> Result<LocalId> {
        let model = schema
            .model(model_name)
            .ok_or_else(|| CommandError::UnknownModel(model_name.to_string()))?;
        self.validate_data(schema, model, &data)?;

        let id = match natural_id(model, &data) {
            Some(id) if self.records.contains_key(&id) => {
                return Err(CommandError::DuplicateRecord(id.to_string()).into());
            }
            Some(id) => id,
            None => {
                self.sequence += 1;
                LocalId::sequence(model.name(), self.sequence)
            }
        };

        let values = model
            .fields()
            .map(|f| (f.name.clone(), initial_value(f)))
            .collect();
        let recreated = self.tombstones.remove(&id);
        self.records.insert(
            id.clone(),
            RecordState {
                id: id.clone(),
                values,
                revision: 0,
            },
        );
        self.by_model
            .entry(model.name().to_string())
            .or_default()
            .push(id.clone());
        self.observers.created(&id);
        tracing::debug!(record = %id, "record created");

        if let Err(err) = self.populate(schema, model, &id, data) {
            self.discard_record(schema, &id);
            if recreated {
                self.tombstones.insert(id);
            }
            return Err(err);
        }

        for field in model.compute_order() {
            self.dirty.push(id.clone(), field.clone());
        }
        Ok(id)
    }

    /// Fill a freshly inserted record: autocreated relations, then `data`.
    fn populate(&mut self, schema: &Schema, model: &Model, id: &LocalId, data: Data) -> Result<()> {
        for field in model.fields().filter(|f| f.autocreate && !data.contains(&f.name)) {
            let command = RelationCommand::Create(Data::new().into());
            self.apply_commands(schema, id, field, vec![command])?;
        }
        self.write_data(schema, model, id, data)
    }

    fn insert_record(&mut self, schema: &Schema, model_name: &str, data: Data) -> Result<LocalId> {
        let model = schema
            .model(model_name)
            .ok_or_else(|| CommandError::UnknownModel(model_name.to_string()))?;
        match natural_id(model, &data) {
            Some(id) if self.records.contains_key(&id) => {
                self.update_record(schema, &id, data)?;
                Ok(id)
            }
            _ => self.create_record(schema, model_name, data),
        }
    }

    fn update_record(&mut self, schema: &Schema, id: &LocalId, data: Data) -> Result<()> {
        self.ensure_alive(id)?;
        let model = model_of(schema, id)?;
        self.validate_data(schema, model, &data)?;
        self.write_data(schema, model, id, data)
    }

    /// Write attributes first, then run relation inputs in order.
    fn write_data(&mut self, schema: &Schema, model: &Model, id: &LocalId, data: Data) -> Result<()> {
        let mut relations = Vec::new();
        for (name, input) in data {
            let Some(field) = model.field(&name) else {
                continue;
            };
            if field.is_relation() {
                relations.push((field, input));
            } else {
                self.apply_input(schema, id, field, input)?;
            }
        }
        for (field, input) in relations {
            self.apply_input(schema, id, field, input)?;
        }
        Ok(())
    }

    /// Apply one field input: an attribute write or relation commands.
    fn apply_input(
        &mut self,
        schema: &Schema,
        id: &LocalId,
        field: &FieldDefinition,
        input: FieldInput,
    ) -> Result<()> {
        match field.kind {
            FieldKind::Attribute => match input {
                FieldInput::Value(value) => self.write_attribute(schema, id, field, value),
                FieldInput::Commands(commands) if commands.is_empty() => Ok(()),
                FieldInput::Commands(_) => Err(CommandError::NotARelation {
                    model: id.model().to_string(),
                    field: field.name.clone(),
                }
                .into()),
            },
            FieldKind::Relation(_) => {
                let commands = relation_commands(id.model(), field, input)?;
                self.apply_commands(schema, id, field, commands)
            }
        }
    }

    fn write_attribute(
        &mut self,
        schema: &Schema,
        id: &LocalId,
        field: &FieldDefinition,
        value: Value,
    ) -> Result<()> {
        self.ensure_alive(id)?;
        let Some(state) = self.records.get_mut(id) else {
            return Err(Error::RecordNotFound(id.clone()));
        };
        let slot = state
            .values
            .entry(field.name.clone())
            .or_insert(FieldValue::Attribute(Value::Null));
        if slot.as_attribute() == Some(&value) {
            return Ok(());
        }
        *slot = FieldValue::Attribute(value);
        self.touch(schema, id, &field.name);
        Ok(())
    }

    /// Record an effective write to `field`: bump the revision, note the
    /// change for observers and invalidate dependents.
    fn touch(&mut self, schema: &Schema, id: &LocalId, field: &str) {
        if let Some(state) = self.records.get_mut(id) {
            state.revision += 1;
        }
        self.observers.updated(id, field);
        self.mark_dependents(schema, id, field);
    }

    /// Reject malformed data before anything is written.
    ///
    /// Relation targets are checked against the graph as it stands, nested
    /// data against its target model.
    fn validate_data(&self, schema: &Schema, model: &Model, data: &Data) -> Result<()> {
        for (name, input) in data.iter() {
            let field = model.field(name).ok_or_else(|| CommandError::UnknownField {
                model: model.name().to_string(),
                field: name.to_string(),
            })?;
            match (&field.kind, input) {
                (FieldKind::Attribute, FieldInput::Value(_)) => {}
                (FieldKind::Attribute, FieldInput::Commands(commands)) => {
                    if !commands.is_empty() {
                        return Err(CommandError::NotARelation {
                            model: model.name().to_string(),
                            field: field.name.clone(),
                        }
                        .into());
                    }
                }
                (FieldKind::Relation(_), input) => {
                    let commands = relation_commands(model.name(), field, input.clone())?;
                    let target = field.to.as_deref().and_then(|to| schema.model(to));
                    for command in &commands {
                        match command {
                            RelationCommand::Link(ids) | RelationCommand::Replace(ids) => {
                                self.check_targets(model.name(), field, ids.as_slice())?;
                            }
                            RelationCommand::Unlink(ids) => {
                                self.check_unlink_targets(model.name(), field, ids.as_slice())?;
                            }
                            RelationCommand::Insert(nested)
                            | RelationCommand::InsertAndReplace(nested)
                            | RelationCommand::Create(nested) => {
                                let Some(target) = target else {
                                    continue;
                                };
                                for item in nested.as_slice() {
                                    self.validate_data(schema, target, item)?;
                                }
                            }
                            RelationCommand::UnlinkAll => {}
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn is_linked(&self, id: &LocalId, field: &str, target: &LocalId) -> bool {
        match self.records.get(id).and_then(|state| state.values.get(field)) {
            Some(FieldValue::Many(set)) => set.has(target),
            Some(FieldValue::One(current)) => current.as_ref() == Some(target),
            _ => false,
        }
    }

    fn linked(&self, id: &LocalId, field: &str) -> Vec<LocalId> {
        self.records
            .get(id)
            .and_then(|state| state.values.get(field))
            .map(FieldValue::linked)
            .unwrap_or_default()
    }
}

fn model_of<'s>(schema: &'s Schema, id: &LocalId) -> Result<&'s Model> {
    schema
        .model(id.model())
        .ok_or_else(|| CommandError::UnknownModel(id.model().to_string()).into())
}

fn initial_value(field: &FieldDefinition) -> FieldValue {
    match field.kind {
        FieldKind::Attribute => FieldValue::Attribute(field.default.clone().unwrap_or(Value::Null)),
        FieldKind::Relation(rel) if rel.is_x2many() => FieldValue::Many(RecordSet::new()),
        FieldKind::Relation(_) => FieldValue::One(None),
    }
}

/// Natural local id, when `data` supplies every natural key field.
fn natural_id(model: &Model, data: &Data) -> Option<LocalId> {
    if model.natural_key().is_empty() {
        return None;
    }
    let parts: Option<Vec<String>> = model
        .natural_key()
        .iter()
        .map(|key| {
            data.value(key)
                .filter(|v| !v.is_null())
                .map(key_component)
        })
        .collect();
    parts.map(|parts| LocalId::natural(model.name(), parts.join("_")))
}

/// Normalize a relation input into commands, checking arity.
///
/// A bare object (or array of objects) is `InsertAndReplace`; `null` is
/// `UnlinkAll`.
fn relation_commands(
    model: &str,
    field: &FieldDefinition,
    input: FieldInput,
) -> std::result::Result<Vec<RelationCommand>, CommandError> {
    let invalid = |value: &Value| CommandError::InvalidValue {
        model: model.to_string(),
        field: field.name.clone(),
        value: value.to_string(),
    };
    let commands = match input {
        FieldInput::Commands(commands) => commands,
        FieldInput::Value(Value::Null) => vec![RelationCommand::UnlinkAll],
        FieldInput::Value(value @ Value::Object(_)) => {
            let data = Data::from_json(value).map_err(|_| CommandError::InvalidValue {
                model: model.to_string(),
                field: field.name.clone(),
                value: "object".into(),
            })?;
            vec![RelationCommand::InsertAndReplace(data.into())]
        }
        FieldInput::Value(Value::Array(items)) => {
            let mut data = Vec::with_capacity(items.len());
            for item in items {
                if !item.is_object() {
                    return Err(invalid(&item));
                }
                data.push(Data::from_json(item)?);
            }
            vec![RelationCommand::InsertAndReplace(data.into())]
        }
        FieldInput::Value(other) => return Err(invalid(&other)),
    };

    if !field.is_x2many() {
        if let Some(command) = commands.iter().find(|c| c.is_many()) {
            return Err(CommandError::ArityMismatch {
                model: model.to_string(),
                field: field.name.clone(),
                command: command.verb(),
            });
        }
    }
    Ok(commands)
}
