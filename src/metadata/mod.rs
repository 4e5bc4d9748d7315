pub mod ddl_script;
pub mod entity;
pub mod enums;
pub mod field;
pub mod store;

pub use ddl_script::{DdlKind, DdlScript, DdlStatus};
pub use entity::{
    CascadePolicy, EntityDefinition, EntityInterface, EntitySource, EntityStatus, InterfaceKind,
    StructureKind, interface_fields, is_valid_identifier,
};
pub use enums::{EnumDefinition, EnumMember};
pub use field::{FieldDataType, FieldMetadata, FieldSource, ForeignKeyAction};
pub use store::MetadataStore;
