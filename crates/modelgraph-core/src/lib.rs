//! modelgraph core - reactive in-memory record graph.
//!
//! Models are declared as lists of [`FieldDefinition`]s, registered in a
//! [`ModelRegistry`] and frozen by [`ModelManager::start`]. The manager then
//! owns every record and keeps the graph consistent across mutations:
//!
//! - relation fields and their inverses always agree,
//! - computed and related fields are re-evaluated when a declared dependency
//!   changes, until nothing is left dirty,
//! - deleting a record deletes what it exclusively owns through causal
//!   relations.

pub mod catalog;
pub mod command;
pub mod config;
pub mod error;
pub mod manager;
pub mod observer;
pub mod record;

pub use catalog::{
    Declared, Dependent, FieldDefinition, FieldHash, FieldKind, Method, Model, ModelDecl,
    ModelPatch, ModelRegistry, RelationType, Schema,
};
pub use command::{Data, FieldInput, OneOrMany, RelationCommand};
pub use config::{ManagerConfig, DEFAULT_MIN_STABILIZATION_PASSES, MAX_CASCADE_DEPTH};
pub use error::{CommandError, ConfigError, Error, Result};
pub use manager::{ManagerStats, ModelManager};
pub use observer::{ChangeEvent, ChangeKind, ObserverId};
pub use record::{FieldValue, LocalId, LocalKey, RecordSet, RecordView};
