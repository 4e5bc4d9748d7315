use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::DataType;

/// Logical field types available to entity designers. Physical column
/// types are derived from these by the DDL generator and the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldDataType {
    String,
    Integer,
    Long,
    Decimal,
    Boolean,
    DateTime,
    Guid,
    Enum,
}

impl FieldDataType {
    /// Storage-level type a field of this kind occupies in a row.
    pub fn storage_type(&self) -> DataType {
        match self {
            Self::String | Self::Enum => DataType::Text,
            Self::Integer | Self::Long => DataType::Integer,
            Self::Decimal => DataType::Float,
            Self::Boolean => DataType::Boolean,
            Self::DateTime => DataType::Timestamp,
            Self::Guid => DataType::Uuid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSource {
    System,
    Interface,
    Custom,
}

/// Referential action for lookup foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    Restrict,
    SetNull,
    Cascade,
}

impl ForeignKeyAction {
    pub fn sql_clause(&self) -> &'static str {
        match self {
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::Cascade => "CASCADE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub id: Uuid,
    pub property_name: String,
    pub display_name: HashMap<String, String>,
    pub data_type: FieldDataType,
    pub length: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    pub required: bool,
    pub unique: bool,
    pub sort_order: i32,
    pub source: FieldSource,
    /// Entity name (without namespace) this field looks up, if any.
    pub lookup_entity_name: Option<String>,
    pub foreign_key_action: ForeignKeyAction,
    pub enum_definition_id: Option<Uuid>,
    pub multi_select: bool,
    /// Literal default, or the markers `NOW` / `NEWID`.
    pub default_value: Option<String>,
}

impl FieldMetadata {
    pub fn new(property_name: impl Into<String>, data_type: FieldDataType) -> Self {
        Self {
            id: Uuid::new_v4(),
            property_name: property_name.into(),
            display_name: HashMap::new(),
            data_type,
            length: None,
            precision: None,
            scale: None,
            required: false,
            unique: false,
            sort_order: 0,
            source: FieldSource::Custom,
            lookup_entity_name: None,
            foreign_key_action: ForeignKeyAction::Restrict,
            enum_definition_id: None,
            multi_select: false,
            default_value: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn with_sort_order(mut self, order: i32) -> Self {
        self.sort_order = order;
        self
    }

    pub fn with_source(mut self, source: FieldSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    pub fn lookup(mut self, entity_name: impl Into<String>, action: ForeignKeyAction) -> Self {
        self.lookup_entity_name = Some(entity_name.into());
        self.foreign_key_action = action;
        self
    }

    pub fn enum_ref(mut self, enum_definition_id: Uuid) -> Self {
        self.enum_definition_id = Some(enum_definition_id);
        self
    }

    pub fn is_lookup(&self) -> bool {
        self.lookup_entity_name.is_some()
    }
}
