//! Model catalog: field definitions, declarations, registry and the frozen schema.

mod field;
mod model;
mod registry;
mod schema;

pub use field::{FieldDefinition, FieldHash, FieldKind, RelationType};
pub use model::{Method, ModelDecl, ModelPatch};
pub use registry::{Declared, ModelRegistry};
pub use schema::{Dependent, Model, Schema};
