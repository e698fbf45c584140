//! Change observers.

use crate::record::LocalId;
use std::collections::{BTreeSet, HashMap};

/// Kind of a record change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The record was created.
    Created,
    /// One or more fields changed.
    Updated,
    /// The record was deleted.
    Deleted,
}

/// A change to one record, coalesced over a whole manager operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// The changed record.
    pub record: LocalId,
    /// Fields whose value changed. Empty for deletions.
    pub fields: BTreeSet<String>,
}

/// Subscription handle returned by `subscribe`.
pub type ObserverId = u64;

type Callback = Box<dyn FnMut(&ChangeEvent) + Send + Sync>;

struct Observer {
    id: ObserverId,
    model: Option<String>,
    callback: Callback,
}

/// Subscribers plus the events gathered during the current operation.
#[derive(Default)]
pub(crate) struct Observers {
    subscribers: Vec<Observer>,
    next_id: ObserverId,
    pending: Vec<ChangeEvent>,
    index: HashMap<LocalId, usize>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self, model: Option<String>, callback: Callback) -> ObserverId {
        self.next_id += 1;
        let id = self.next_id;
        self.subscribers.push(Observer {
            id,
            model,
            callback,
        });
        tracing::debug!(observer = id, "observer subscribed");
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|o| o.id != id);
        let removed = before != self.subscribers.len();
        if removed {
            tracing::debug!(observer = id, "observer unsubscribed");
        }
        removed
    }

    pub(crate) fn created(&mut self, record: &LocalId) {
        let event = self.event(record, ChangeKind::Created);
        event.kind = ChangeKind::Created;
        event.fields.clear();
    }

    pub(crate) fn updated(&mut self, record: &LocalId, field: &str) {
        let event = self.event(record, ChangeKind::Updated);
        if event.kind != ChangeKind::Deleted {
            event.fields.insert(field.to_string());
        }
    }

    pub(crate) fn deleted(&mut self, record: &LocalId) {
        let event = self.event(record, ChangeKind::Deleted);
        event.kind = ChangeKind::Deleted;
        event.fields.clear();
    }

    fn event(&mut self, record: &LocalId, kind: ChangeKind) -> &mut ChangeEvent {
        let index = match self.index.get(record).copied() {
            Some(i) => i,
            None => {
                self.pending.push(ChangeEvent {
                    kind,
                    record: record.clone(),
                    fields: BTreeSet::new(),
                });
                self.index.insert(record.clone(), self.pending.len() - 1);
                self.pending.len() - 1
            }
        };
        &mut self.pending[index]
    }

    /// Deliver pending events to matching subscribers, in the order the
    /// records were first touched.
    pub(crate) fn flush(&mut self) {
        self.index.clear();
        let events = std::mem::take(&mut self.pending);
        if self.subscribers.is_empty() {
            return;
        }
        for event in &events {
            for observer in &mut self.subscribers {
                let matches = observer
                    .model
                    .as_deref()
                    .map_or(true, |m| m == event.record.model());
                if matches {
                    (observer.callback)(event);
                }
            }
        }
    }

    /// Drop the pending event of one record.
    pub(crate) fn forget(&mut self, record: &LocalId) {
        let Some(index) = self.index.remove(record) else {
            return;
        };
        self.pending.remove(index);
        for slot in self.index.values_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
    }

    pub(crate) fn discard(&mut self) {
        self.index.clear();
        self.pending.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}
