//! Relation commands and symmetric link maintenance.
//!
//! Every change to a relation goes through `link_pair` or
//! `unlink_pair`, which update both sides together.

use super::ModelManager;
use crate::catalog::{FieldDefinition, Schema};
use crate::command::{Data, RelationCommand};
use crate::error::{CommandError, ConfigError, Error, Result};
use crate::record::{FieldValue, LocalId};

impl ModelManager {
    /// Run relation commands against `id.field`, in order.
    pub(super) fn apply_commands(
        &mut self,
        schema: &Schema,
        id: &LocalId,
        field: &FieldDefinition,
        commands: Vec<RelationCommand>,
    ) -> Result<()> {
        self.ensure_alive(id)?;
        for command in commands {
            match command {
                RelationCommand::Link(targets) => {
                    let targets = targets.into_vec();
                    self.check_targets(id.model(), field, &targets)?;
                    for target in &targets {
                        self.link_pair(schema, id, field, target)?;
                    }
                }
                RelationCommand::Unlink(targets) => {
                    let targets = targets.into_vec();
                    self.check_unlink_targets(id.model(), field, &targets)?;
                    if field.is_x2many() {
                        for target in &targets {
                            self.unlink_pair(schema, id, field, target)?;
                        }
                    } else if let Some(current) = self.linked(id, &field.name).pop() {
                        // a single-valued side is cleared whatever it holds
                        self.unlink_pair(schema, id, field, &current)?;
                    }
                }
                RelationCommand::UnlinkAll => {
                    for target in &self.linked(id, &field.name) {
                        self.unlink_pair(schema, id, field, target)?;
                    }
                }
                RelationCommand::Replace(targets) => {
                    let targets = targets.into_vec();
                    self.check_targets(id.model(), field, &targets)?;
                    self.replace(schema, id, field, targets)?;
                }
                RelationCommand::Insert(data) => {
                    let targets = self.insert_targets(schema, field, data.into_vec(), true)?;
                    for target in &targets {
                        self.link_pair(schema, id, field, target)?;
                    }
                }
                RelationCommand::InsertAndReplace(data) => {
                    let targets = self.insert_targets(schema, field, data.into_vec(), true)?;
                    self.replace(schema, id, field, targets)?;
                }
                RelationCommand::Create(data) => {
                    let targets = self.insert_targets(schema, field, data.into_vec(), false)?;
                    for target in &targets {
                        self.link_pair(schema, id, field, target)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Make `id.field` hold exactly `targets`, touching only the difference.
    fn replace(
        &mut self,
        schema: &Schema,
        id: &LocalId,
        field: &FieldDefinition,
        targets: Vec<LocalId>,
    ) -> Result<()> {
        for current in self.linked(id, &field.name) {
            if !targets.contains(&current) {
                self.unlink_pair(schema, id, field, &current)?;
            }
        }
        for target in &targets {
            self.link_pair(schema, id, field, target)?;
        }
        Ok(())
    }

    fn insert_targets(
        &mut self,
        schema: &Schema,
        field: &FieldDefinition,
        data: Vec<Data>,
        find_existing: bool,
    ) -> Result<Vec<LocalId>> {
        let Some(to) = field.to.as_deref() else {
            return Ok(Vec::new());
        };
        data.into_iter()
            .map(|d| {
                if find_existing {
                    self.insert_record(schema, to, d)
                } else {
                    self.create_record(schema, to, d)
                }
            })
            .collect()
    }

    /// Link targets must belong to the relation's model and be alive.
    pub(super) fn check_targets(
        &self,
        model: &str,
        field: &FieldDefinition,
        targets: &[LocalId],
    ) -> Result<()> {
        for target in targets {
            check_target_model(model, field, target)?;
            self.ensure_alive(target)?;
        }
        Ok(())
    }

    /// Unlink targets must belong to the relation's model and have existed.
    /// Deleted records are accepted, being unlinked already.
    pub(super) fn check_unlink_targets(
        &self,
        model: &str,
        field: &FieldDefinition,
        targets: &[LocalId],
    ) -> Result<()> {
        for target in targets {
            check_target_model(model, field, target)?;
            if !self.records.contains_key(target) && !self.tombstones.contains(target) {
                return Err(Error::RecordNotFound(target.clone()));
            }
        }
        Ok(())
    }

    /// Link `a.field` to `b` and `b.inverse` to `a`.
    ///
    /// Single-valued sides drop their previous value first, on both ends.
    /// Linking an already linked pair is a no-op.
    pub(super) fn link_pair(
        &mut self,
        schema: &Schema,
        a: &LocalId,
        field: &FieldDefinition,
        b: &LocalId,
    ) -> Result<()> {
        let inverse = inverse_of(schema, a, field)?;

        if self.is_linked(a, &field.name, b) {
            return Ok(());
        }
        if !field.is_x2many() {
            if let Some(current) = self.linked(a, &field.name).pop() {
                self.unlink_pair(schema, a, field, &current)?;
            }
        }

        if !inverse.is_x2many() {
            if let Some(previous) = self.linked(b, &inverse.name).pop() {
                if &previous != a {
                    self.unlink_pair(schema, b, inverse, &previous)?;
                }
            }
        }

        self.add_half(a, &field.name, b);
        self.add_half(b, &inverse.name, a);
        self.touch(schema, a, &field.name);
        self.touch(schema, b, &inverse.name);
        Ok(())
    }

    /// Remove the link between `a.field` and `b`, on both sides.
    ///
    /// Each side is only cleared where it actually holds the other record.
    /// Records unlinked from a causal relation become orphan candidates.
    pub(super) fn unlink_pair(
        &mut self,
        schema: &Schema,
        a: &LocalId,
        field: &FieldDefinition,
        b: &LocalId,
    ) -> Result<()> {
        let inverse = inverse_of(schema, a, field)?;
        let removed_here = self.remove_half(a, &field.name, b);
        let removed_there = self.remove_half(b, &inverse.name, a);
        if removed_here {
            self.touch(schema, a, &field.name);
        }
        if removed_there {
            self.touch(schema, b, &inverse.name);
        }
        if removed_here || removed_there {
            if field.is_causal {
                self.orphans.push(b.clone());
            }
            if inverse.is_causal {
                self.orphans.push(a.clone());
            }
        }
        Ok(())
    }

    fn add_half(&mut self, id: &LocalId, field: &str, target: &LocalId) {
        let Some(value) = self
            .records
            .get_mut(id)
            .and_then(|state| state.values.get_mut(field))
        else {
            return;
        };
        match value {
            FieldValue::One(slot) => *slot = Some(target.clone()),
            FieldValue::Many(set) => {
                set.add(target.clone());
            }
            FieldValue::Attribute(_) => {}
        }
    }

    fn remove_half(&mut self, id: &LocalId, field: &str, target: &LocalId) -> bool {
        let Some(value) = self
            .records
            .get_mut(id)
            .and_then(|state| state.values.get_mut(field))
        else {
            return false;
        };
        match value {
            FieldValue::One(slot) if slot.as_ref() == Some(target) => {
                *slot = None;
                true
            }
            FieldValue::Many(set) => set.delete(target),
            _ => false,
        }
    }
}

fn check_target_model(model: &str, field: &FieldDefinition, target: &LocalId) -> Result<()> {
    let expected = field.to.as_deref().unwrap_or_default();
    if target.model() == expected {
        return Ok(());
    }
    Err(CommandError::InvalidTarget {
        model: model.to_string(),
        field: field.name.clone(),
        expected: expected.to_string(),
        record: target.to_string(),
    }
    .into())
}

/// The inverse field of `owner.field` on the target model.
pub(super) fn inverse_of<'s>(
    schema: &'s Schema,
    owner: &LocalId,
    field: &FieldDefinition,
) -> Result<&'s FieldDefinition> {
    let missing = || ConfigError::MissingInverse {
        model: owner.model().to_string(),
        field: field.name.clone(),
        to: field.to.clone().unwrap_or_default(),
        inverse: field.inverse.clone(),
    };
    let to = field.to.as_deref().ok_or_else(missing)?;
    let name = field.inverse.as_deref().ok_or_else(missing)?;
    schema
        .model(to)
        .and_then(|model| model.field(name))
        .ok_or_else(|| missing().into())
}
