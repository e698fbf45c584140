//! Causal deletion.
//!
//! Deleting a record deletes every record it exclusively owns through
//! causal relations, depth-first, children before their owner. A record
//! that is also owned from outside the deleted set survives.

use super::{model_of, ModelManager};
use crate::catalog::Schema;
use crate::error::{Error, Result};
use crate::record::LocalId;
use std::collections::HashSet;

impl ModelManager {
    pub(super) fn delete_record(&mut self, schema: &Schema, root: &LocalId) -> Result<()> {
        self.ensure_alive(root)?;

        let mut visited = HashSet::new();
        visited.insert(root.clone());
        let mut owned = Vec::new();
        self.collect_owned(schema, root, 0, &mut visited, &mut owned)?;

        // Drop records with an owner outside the set until nothing changes;
        // whatever they own in turn falls out on the next round.
        let mut doomed: HashSet<LocalId> = visited;
        loop {
            let excluded: Vec<LocalId> = doomed
                .iter()
                .filter(|id| *id != root && self.owned_from_outside(schema, id, &doomed))
                .cloned()
                .collect();
            if excluded.is_empty() {
                break;
            }
            for id in &excluded {
                doomed.remove(id);
            }
        }

        if !owned.is_empty() {
            tracing::debug!(
                record = %root,
                owned = owned.len(),
                deleted = doomed.len() - 1,
                "cascading delete"
            );
        }
        for id in owned.iter().filter(|id| doomed.contains(*id)) {
            self.remove_record(schema, id)?;
        }
        self.remove_record(schema, root)
    }

    /// Post-order walk of the causal relations below `id`.
    fn collect_owned(
        &self,
        schema: &Schema,
        id: &LocalId,
        depth: usize,
        visited: &mut HashSet<LocalId>,
        owned: &mut Vec<LocalId>,
    ) -> Result<()> {
        let model = model_of(schema, id)?;
        for field in model.relation_fields().filter(|f| f.is_causal) {
            for child in self.linked(id, &field.name) {
                if !visited.insert(child.clone()) {
                    continue;
                }
                if depth + 1 > self.config.max_cascade_depth {
                    return Err(Error::CascadeDepthExceeded { depth: depth + 1 });
                }
                self.collect_owned(schema, &child, depth + 1, visited, owned)?;
                owned.push(child);
            }
        }
        Ok(())
    }

    fn owned_from_outside(&self, schema: &Schema, id: &LocalId, set: &HashSet<LocalId>) -> bool {
        let Some(model) = schema.model(id.model()) else {
            return false;
        };
        model
            .causal_owner_fields()
            .iter()
            .flat_map(|field| self.linked(id, field))
            .any(|owner| !set.contains(&owner))
    }

    fn has_causal_owner(&self, schema: &Schema, id: &LocalId) -> bool {
        schema.model(id.model()).is_some_and(|model| {
            model
                .causal_owner_fields()
                .iter()
                .any(|field| !self.linked(id, field).is_empty())
        })
    }

    /// Delete records unlinked from their last causal owner.
    pub(super) fn collect_orphans(&mut self, schema: &Schema) -> Result<()> {
        loop {
            let candidates = std::mem::take(&mut self.orphans);
            if candidates.is_empty() {
                return Ok(());
            }
            for id in candidates {
                if self.records.contains_key(&id) && !self.has_causal_owner(schema, &id) {
                    tracing::debug!(record = %id, "deleting orphan");
                    self.delete_record(schema, &id)?;
                }
            }
        }
    }

    /// Unlink a record from every counterpart and drop it, leaving a
    /// tombstone.
    fn remove_record(&mut self, schema: &Schema, id: &LocalId) -> Result<()> {
        if !self.records.contains_key(id) {
            return Ok(());
        }
        let detached = self.detach_record(schema, id);
        self.tombstones.insert(id.clone());
        self.observers.deleted(id);
        tracing::debug!(record = %id, "record deleted");
        detached
    }

    /// Drop a record whose creation failed part way. No tombstone is left
    /// and no event is delivered for it.
    pub(super) fn discard_record(&mut self, schema: &Schema, id: &LocalId) {
        if let Err(err) = self.detach_record(schema, id) {
            tracing::warn!(record = %id, error = %err, "discarded record left links behind");
        }
        self.observers.forget(id);
        tracing::debug!(record = %id, "failed record discarded");
    }

    fn detach_record(&mut self, schema: &Schema, id: &LocalId) -> Result<()> {
        let unlinked = self.unlink_counterparts(schema, id);
        self.records.remove(id);
        if let Some(ids) = self.by_model.get_mut(id.model()) {
            ids.retain(|other| other != id);
        }
        unlinked
    }

    fn unlink_counterparts(&mut self, schema: &Schema, id: &LocalId) -> Result<()> {
        let model = model_of(schema, id)?;
        for field in model.relation_fields() {
            for target in self.linked(id, &field.name) {
                self.unlink_pair(schema, id, field, &target)?;
            }
        }
        Ok(())
    }
}
