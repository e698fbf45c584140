//! Record identifiers.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Key part of a local id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocalKey {
    /// Built from the model's natural key values.
    Natural(String),
    /// Allocated from the manager's sequence.
    Sequence(u64),
}

/// Stable identifier of a record, scoped to its model.
///
/// Natural ids render as `Thread_100`, sequence ids as `Thread#1`; the two
/// never collide since the key kind is part of equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId {
    model: Arc<str>,
    key: LocalKey,
}

impl LocalId {
    /// Create a sequence-based id.
    pub fn sequence(model: impl Into<Arc<str>>, seq: u64) -> Self {
        Self {
            model: model.into(),
            key: LocalKey::Sequence(seq),
        }
    }

    /// Create a natural-key id.
    pub fn natural(model: impl Into<Arc<str>>, key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            key: LocalKey::Natural(key.into()),
        }
    }

    /// Name of the model this record belongs to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The key part.
    pub fn key(&self) -> &LocalKey {
        &self.key
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            LocalKey::Natural(k) => write!(f, "{}_{}", self.model, k),
            LocalKey::Sequence(n) => write!(f, "{}#{}", self.model, n),
        }
    }
}

impl Serialize for LocalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Render one natural key component.
///
/// Strings are used as-is, everything else in its JSON form. `_` joins the
/// components of a composite key, so it is escaped (as is `\\`) inside one.
pub(crate) fn key_component(value: &serde_json::Value) -> String {
    let raw = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if !raw.contains(['_', '\\']) {
        return raw;
    }
    let mut escaped = String::with_capacity(raw.len() + 2);
    for c in raw.chars() {
        if c == '_' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
