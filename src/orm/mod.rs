//! Record/table mapping
//!
//! - **Table metadata** (`table.rs`): what a record type maps to, declared with `record!`
//! - **Registry** (`registry.rs`): derive-once cache of that metadata
//! - **Model** (`model.rs`): metadata bound to a value, a sequence or a field path
//! - **Relations** (`relation.rs`): to-one / to-many descriptors and the batched `Loader`

mod macros;
pub mod model;
pub mod registry;
pub mod relation;
pub mod table;

pub use model::{Current, Model, Sequence};
pub use registry::Registry;
pub use relation::{Loader, LoaderConfig, OrphanPolicy, RelationKind};
pub use table::{Column, Method, Record, Table, TableBuilder};
