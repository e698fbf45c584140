//! Core error types.

use crate::record::LocalId;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Model layer errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid model declarations, or a graph that failed to stabilize.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed create/update data.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// The record was deleted, possibly earlier in the same operation.
    #[error("record {0} has been deleted")]
    RecordDeleted(LocalId),

    /// The record never existed.
    #[error("record {0} not found")]
    RecordNotFound(LocalId),

    /// Graph operation attempted before `start()`.
    #[error("model manager not started")]
    NotStarted,

    /// Declaration attempted after `start()`.
    #[error("model manager already started")]
    AlreadyStarted,

    /// Causal closure deeper than the configured limit.
    #[error("causal deletion exceeded maximum depth of {depth}")]
    CascadeDepthExceeded {
        /// The depth that was reached.
        depth: usize,
    },
}

impl Error {
    /// Whether this error reports a reference to a deleted record.
    ///
    /// Asynchronous callers awaiting some initialization step use this to
    /// ignore records that vanished in the meantime.
    pub fn is_record_deleted(&self) -> bool {
        matches!(self, Error::RecordDeleted(_))
    }

    /// Whether this error is a fatal configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Configuration errors, raised at `start()` or at the first stabilization
/// that cannot settle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Two declarations for the same model name.
    #[error("model {0} declared twice")]
    DuplicateModel(String),

    /// Two fields with the same name within one declaration.
    #[error("field {model}.{field} declared twice")]
    DuplicateField {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
    },

    /// A relation, patch or dependency refers to an undeclared model.
    #[error("unknown model {model} referenced by {referenced_by}")]
    UnknownModel {
        /// The missing model.
        model: String,
        /// Who referenced it.
        referenced_by: String,
    },

    /// A relation field without a declared inverse, or whose inverse is
    /// absent from the target model.
    #[error("relation {model}.{field} has no inverse {inverse:?} on {to}")]
    MissingInverse {
        /// Model owning the relation.
        model: String,
        /// Relation field.
        field: String,
        /// Target model.
        to: String,
        /// Declared inverse name, if any.
        inverse: Option<String>,
    },

    /// Inverse declared but not symmetric.
    #[error("relation {model}.{field} and its inverse {to}.{inverse} do not match: {reason}")]
    InverseMismatch {
        /// Model owning the relation.
        model: String,
        /// Relation field.
        field: String,
        /// Target model.
        to: String,
        /// Inverse field.
        inverse: String,
        /// What does not match.
        reason: String,
    },

    /// A field declaration that makes no sense (e.g. causal attribute).
    #[error("invalid field {model}.{field}: {reason}")]
    InvalidField {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// Why it is invalid.
        reason: String,
    },

    /// Unresolvable `related` path.
    #[error("related path {path:?} of {model}.{field} cannot be resolved: {reason}")]
    InvalidRelated {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// The dotted path.
        path: String,
        /// Why it cannot be resolved.
        reason: String,
    },

    /// A dependency naming an unknown field.
    #[error("dependency {dependency:?} of {model}.{field} cannot be resolved")]
    UnknownDependency {
        /// Model name.
        model: String,
        /// Dependent field.
        field: String,
        /// The unresolvable dependency.
        dependency: String,
    },

    /// `compute` names a method the model does not declare.
    #[error("compute method {method} of {model}.{field} is not declared")]
    UnknownComputeMethod {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// Missing method.
        method: String,
    },

    /// Computed fields of one model depend on each other in a cycle.
    #[error("dependency cycle among computed fields of {model}: {fields:?}")]
    DependencyCycle {
        /// Model name.
        model: String,
        /// Fields taking part in the cycle.
        fields: Vec<String>,
    },

    /// Natural key naming something other than a plain attribute.
    #[error("natural key field {model}.{field} must be a stored attribute")]
    InvalidNaturalKey {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
    },

    /// Model factories whose dependencies never got registered.
    #[error("models with unresolved dependencies: {0:?}")]
    UnresolvedDependencies(Vec<String>),

    /// Expected model declarations that never registered.
    #[error("expected models never declared: {0:?}")]
    MissingDeclarations(Vec<String>),

    /// Recomputation did not reach a fixed point within the pass bound.
    #[error("graph did not stabilize after {passes} passes; still dirty: {pending:?}")]
    Unstable {
        /// Number of passes run.
        passes: usize,
        /// `localId.field` entries still marked dirty.
        pending: Vec<String>,
    },
}

/// Errors raised by a single create/update/insert call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Operation on an undeclared model.
    #[error("unknown model {0}")]
    UnknownModel(String),

    /// Data names a field the model does not have.
    #[error("unknown field {model}.{field}")]
    UnknownField {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
    },

    /// Several records supplied to a single-valued relation.
    #[error("relation {model}.{field} holds one record but several were supplied to {command}")]
    ArityMismatch {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// The offending command verb.
        command: &'static str,
    },

    /// Relation command supplied for an attribute field.
    #[error("{model}.{field} is an attribute and does not accept relation commands")]
    NotARelation {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
    },

    /// Bare value that cannot be read as record data.
    #[error("invalid value for relation {model}.{field}: {value}")]
    InvalidValue {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// The rejected value.
        value: String,
    },

    /// Linking a record of the wrong model.
    #[error("record {record} cannot be linked to {model}.{field} (expects {expected})")]
    InvalidTarget {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// Expected target model.
        expected: String,
        /// Supplied record.
        record: String,
    },

    /// `create` with a natural key that already exists.
    #[error("record {0} already exists")]
    DuplicateRecord(String),

    /// Non-object JSON handed to `Data::from_json`.
    #[error("record data must be a JSON object, got {0}")]
    NotAnObject(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LocalId;

    #[test]
    fn test_record_deleted_is_distinguishable() {
        let err = Error::RecordDeleted(LocalId::sequence("Thread", 3));
        assert!(err.is_record_deleted());
        assert!(!err.is_config());

        let err = Error::RecordNotFound(LocalId::sequence("Thread", 3));
        assert!(!err.is_record_deleted());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: Error = ConfigError::DuplicateModel("Thread".into()).into();
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "configuration error: model Thread declared twice"
        );
    }
}
