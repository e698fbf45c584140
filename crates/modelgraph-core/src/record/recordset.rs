//! Ordered, duplicate-free record collections.

use super::LocalId;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashSet;

/// The value of every multi-valued relation field.
///
/// Iteration follows insertion order and a record appears at most once.
/// `add` and `delete` mutate in place; `filter`, `sort` and `concat` build
/// new sets.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    order: Vec<LocalId>,
    members: HashSet<LocalId>,
}

impl RecordSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, LocalId> {
        self.order.iter()
    }

    /// Add a record. Returns false when it was already a member.
    pub fn add(&mut self, record: LocalId) -> bool {
        if !self.members.insert(record.clone()) {
            return false;
        }
        self.order.push(record);
        true
    }

    /// Remove a record. Returns false when it was not a member.
    pub fn delete(&mut self, record: &LocalId) -> bool {
        if !self.members.remove(record) {
            return false;
        }
        self.order.retain(|r| r != record);
        true
    }

    /// Membership test.
    pub fn has(&self, record: &LocalId) -> bool {
        self.members.contains(record)
    }

    /// Same as [`has`](Self::has).
    pub fn includes(&self, record: &LocalId) -> bool {
        self.has(record)
    }

    /// New set with the records matching `predicate`.
    pub fn filter(&self, mut predicate: impl FnMut(&LocalId) -> bool) -> RecordSet {
        self.order.iter().filter(|r| predicate(r)).cloned().collect()
    }

    /// First record matching `predicate`.
    pub fn find(&self, mut predicate: impl FnMut(&LocalId) -> bool) -> Option<&LocalId> {
        self.order.iter().find(|r| predicate(r))
    }

    /// Map every record, in order.
    pub fn map<T>(&self, f: impl FnMut(&LocalId) -> T) -> Vec<T> {
        self.order.iter().map(f).collect()
    }

    /// Fold over the records, in order.
    pub fn reduce<T>(&self, init: T, f: impl FnMut(T, &LocalId) -> T) -> T {
        self.order.iter().fold(init, f)
    }

    /// Whether any record matches `predicate`.
    pub fn some(&self, mut predicate: impl FnMut(&LocalId) -> bool) -> bool {
        self.order.iter().any(|r| predicate(r))
    }

    /// New set sorted with `compare` (stable).
    pub fn sort(&self, mut compare: impl FnMut(&LocalId, &LocalId) -> Ordering) -> RecordSet {
        let mut order = self.order.clone();
        order.sort_by(|a, b| compare(a, b));
        Self {
            order,
            members: self.members.clone(),
        }
    }

    /// First record in order.
    pub fn first(&self) -> Option<&LocalId> {
        self.order.first()
    }

    /// Last record in order.
    pub fn last(&self) -> Option<&LocalId> {
        self.order.last()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// New set holding these records followed by every record of `others`,
    /// flattened and deduplicated.
    pub fn concat<I, J>(&self, others: I) -> RecordSet
    where
        I: IntoIterator<Item = J>,
        J: IntoIterator<Item = LocalId>,
    {
        let mut set = self.clone();
        for other in others {
            for record in other {
                set.add(record);
            }
        }
        set
    }

    /// Records in order, as a slice.
    pub fn as_slice(&self) -> &[LocalId] {
        &self.order
    }
}

impl PartialEq for RecordSet {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for RecordSet {}

impl FromIterator<LocalId> for RecordSet {
    fn from_iter<T: IntoIterator<Item = LocalId>>(iter: T) -> Self {
        let mut set = RecordSet::new();
        for record in iter {
            set.add(record);
        }
        set
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a LocalId;
    type IntoIter = std::slice::Iter<'a, LocalId>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.iter()
    }
}

impl IntoIterator for RecordSet {
    type Item = LocalId;
    type IntoIter = std::vec::IntoIter<LocalId>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}

impl Serialize for RecordSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.order.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> LocalId {
        LocalId::sequence("Message", n)
    }

    #[test]
    fn test_add_is_unique_and_ordered() {
        let mut set = RecordSet::new();
        assert!(set.add(id(2)));
        assert!(set.add(id(1)));
        assert!(!set.add(id(2)));

        assert_eq!(set.len(), 2);
        assert_eq!(set.first(), Some(&id(2)));
        assert_eq!(set.last(), Some(&id(1)));
    }

    #[test]
    fn test_delete() {
        let mut set: RecordSet = [id(1), id(2), id(3)].into_iter().collect();
        assert!(set.delete(&id(2)));
        assert!(!set.delete(&id(2)));
        assert!(!set.has(&id(2)));
        assert_eq!(set.as_slice(), &[id(1), id(3)]);
    }

    #[test]
    fn test_non_mutating_operations() {
        let set: RecordSet = [id(3), id(1), id(2)].into_iter().collect();

        let sorted = set.sort(|a, b| a.cmp(b));
        assert_eq!(sorted.as_slice(), &[id(1), id(2), id(3)]);
        assert_eq!(set.first(), Some(&id(3)));

        let filtered = set.filter(|r| *r != id(1));
        assert_eq!(filtered.len(), 2);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_queries() {
        let set: RecordSet = [id(1), id(2), id(3)].into_iter().collect();

        assert_eq!(set.find(|r| *r == id(2)), Some(&id(2)));
        assert!(set.some(|r| *r == id(3)));
        assert!(!set.some(|r| *r == id(9)));
        assert!(set.includes(&id(1)));
        assert_eq!(set.map(|r| r.to_string()), vec!["Message#1", "Message#2", "Message#3"]);
        assert_eq!(set.reduce(0, |n, _| n + 1), 3);
    }

    #[test]
    fn test_concat_flattens() {
        let set: RecordSet = [id(1)].into_iter().collect();
        let other: RecordSet = [id(2), id(1)].into_iter().collect();

        let joined = set.concat(vec![other.clone(), RecordSet::new()]);
        assert_eq!(joined.as_slice(), &[id(1), id(2)]);

        let joined = set.concat([vec![id(4), id(3)]]);
        assert_eq!(joined.as_slice(), &[id(1), id(4), id(3)]);
    }
}
