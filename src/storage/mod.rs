pub mod backend;
pub mod memory;
pub mod table;

pub use backend::{BatchError, ColumnInfo, SchemaBackend};
pub use memory::MemoryBackend;
pub use table::Table;
