//! Dirty tracking and stabilization of computed and related fields.

use super::{model_of, ModelManager};
use crate::catalog::{Dependent, FieldDefinition, FieldKind, Schema};
use crate::command::{FieldInput, OneOrMany, RelationCommand};
use crate::error::{ConfigError, Result};
use crate::record::{FieldValue, LocalId, RecordView};
use serde_json::Value;
use std::collections::HashSet;

type Entry = (LocalId, String);

/// Ordered set of `(record, field)` pairs awaiting recomputation.
///
/// Entries of the pass being run stay "in flight" until processed, so that
/// marking them again within the same pass does not schedule a second run.
#[derive(Debug, Default)]
pub(crate) struct DirtyQueue {
    order: Vec<Entry>,
    queued: HashSet<Entry>,
    in_flight: HashSet<Entry>,
}

impl DirtyQueue {
    pub(crate) fn push(&mut self, id: LocalId, field: String) -> bool {
        let entry = (id, field);
        if self.in_flight.contains(&entry) || self.queued.contains(&entry) {
            return false;
        }
        self.queued.insert(entry.clone());
        self.order.push(entry);
        true
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn begin_pass(&mut self) -> Vec<Entry> {
        self.queued.clear();
        let batch = std::mem::take(&mut self.order);
        self.in_flight = batch.iter().cloned().collect();
        batch
    }

    fn finish(&mut self, entry: &Entry) {
        self.in_flight.remove(entry);
    }

    fn describe(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|(id, field)| format!("{}.{}", id, field))
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.queued.clear();
        self.in_flight.clear();
    }
}

impl ModelManager {
    /// Mark every field declaring a dependency on `id.field` as dirty.
    pub(super) fn mark_dependents(&mut self, schema: &Schema, id: &LocalId, field: &str) {
        let Some(model) = schema.model(id.model()) else {
            return;
        };
        for dependent in model.dependents(field) {
            match &dependent.via {
                None => self.enqueue(schema, id, dependent),
                Some(relation) => {
                    for target in self.linked(id, relation) {
                        self.enqueue(schema, &target, dependent);
                    }
                }
            }
        }
    }

    fn enqueue(&mut self, schema: &Schema, target: &LocalId, dependent: &Dependent) {
        let carries_hash = schema
            .model(target.model())
            .and_then(|m| m.field(&dependent.field))
            .is_some_and(|f| f.has_hash(&dependent.hash));
        if carries_hash && self.records.contains_key(target) {
            self.dirty.push(target.clone(), dependent.field.clone());
        }
    }

    /// Collect orphans and drain the dirty queue until nothing is left.
    ///
    /// Each pass recomputes the entries queued before it started, ordered by
    /// their field's rank in the model's compute order; fields invalidated
    /// during a pass run in the next one. Exceeding the pass bound is an
    /// unstable graph.
    pub(super) fn stabilize(&mut self, schema: &Schema) -> Result<()> {
        let mut passes = 0;
        loop {
            self.collect_orphans(schema)?;
            if self.dirty.is_empty() {
                return Ok(());
            }
            let bound = self
                .config
                .stabilization_bound(self.computed_entries(schema));
            if passes >= bound {
                let pending = self.dirty.describe();
                tracing::warn!(passes, pending = pending.len(), "graph did not stabilize");
                return Err(ConfigError::Unstable { passes, pending }.into());
            }
            passes += 1;
            self.passes += 1;

            let mut batch = self.dirty.begin_pass();
            batch.sort_by_key(|(id, field)| {
                schema
                    .model(id.model())
                    .map_or(usize::MAX, |m| m.compute_rank(field))
            });
            for entry in batch {
                self.dirty.finish(&entry);
                let (id, field) = entry;
                if self.records.contains_key(&id) {
                    self.recompute(schema, &id, &field)?;
                }
            }
        }
    }

    /// Live `(record, field)` pairs that hold a computed or related value.
    fn computed_entries(&self, schema: &Schema) -> usize {
        schema
            .models()
            .map(|model| {
                let records = self.by_model.get(model.name()).map_or(0, Vec::len);
                records * model.compute_order().len()
            })
            .sum()
    }

    fn recompute(&mut self, schema: &Schema, id: &LocalId, field_name: &str) -> Result<()> {
        let model = model_of(schema, id)?;
        let Some(field) = model.field(field_name) else {
            return Ok(());
        };
        let view = self.record(id)?;
        let input = match &field.compute {
            Some(method) => match model.method(method) {
                Some(method) => method(&view),
                None => return Ok(()),
            },
            None => related_input(&view, field),
        };
        self.computations += 1;
        tracing::trace!(record = %id, field = field_name, "recomputed");
        self.apply_input(schema, id, field, input)
    }
}

/// Value of a related field: the mirrored field read through the relation.
///
/// Over a many relation, attribute values are flattened into an array
/// (skipping nulls) and relation values into one record list.
fn related_input(view: &RecordView<'_>, field: &FieldDefinition) -> FieldInput {
    let Some((relation, far)) = field.related_path() else {
        return FieldInput::none();
    };
    let through_many = view
        .model()
        .field(relation)
        .is_some_and(FieldDefinition::is_x2many);
    let targets: Vec<RecordView<'_>> = match view.get(relation) {
        Some(FieldValue::One(_)) => view.one(relation).into_iter().collect(),
        Some(FieldValue::Many(_)) => view.many(relation),
        _ => Vec::new(),
    };

    match field.kind {
        FieldKind::Attribute if through_many => {
            let mut values = Vec::new();
            for target in &targets {
                match target.attr(far) {
                    Value::Null => {}
                    Value::Array(items) => values.extend(items.iter().cloned()),
                    other => values.push(other.clone()),
                }
            }
            FieldInput::Value(Value::Array(values))
        }
        FieldKind::Attribute => FieldInput::Value(
            targets
                .first()
                .map(|target| target.attr(far).clone())
                .unwrap_or(Value::Null),
        ),
        FieldKind::Relation(_) => {
            let mut ids: Vec<LocalId> = Vec::new();
            for target in &targets {
                for id in target.get(far).map(FieldValue::linked).unwrap_or_default() {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
            if field.is_x2many() {
                FieldInput::command(RelationCommand::Replace(OneOrMany::Many(ids)))
            } else {
                match ids.into_iter().next() {
                    Some(id) => FieldInput::command(RelationCommand::Replace(OneOrMany::One(id))),
                    None => FieldInput::command(RelationCommand::UnlinkAll),
                }
            }
        }
    }
}
