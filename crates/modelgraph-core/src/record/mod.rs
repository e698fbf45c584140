//! Records: identifiers, record sets, stored values and read-only views.

mod local_id;
mod recordset;
mod value;
mod view;

pub(crate) use local_id::key_component;
pub use local_id::{LocalId, LocalKey};
pub use recordset::RecordSet;
pub use value::FieldValue;
pub use view::RecordView;
