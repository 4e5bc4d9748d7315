use std::collections::HashMap;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{EngineError, Result};
use crate::metadata::field::{FieldDataType, FieldMetadata, FieldSource};

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityStatus {
    Draft,
    Published,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureKind {
    Single,
    MasterDetail,
    MasterDetailGrandchild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntitySource {
    System,
    Custom,
}

/// Capability interfaces an entity can implement. Publishing materializes
/// their fields with source = Interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceKind {
    Base,
    Archive,
    Audit,
    Version,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityInterface {
    pub kind: InterfaceKind,
    pub is_enabled: bool,
}

impl EntityInterface {
    pub fn new(kind: InterfaceKind) -> Self {
        Self { kind, is_enabled: true }
    }
}

/// What happens to detail rows when an aggregate head is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CascadePolicy {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub id: Uuid,
    pub namespace: String,
    pub entity_name: String,
    /// Endpoint / table basename; lowercase. Empty means derive from the name.
    pub entity_route: String,
    pub structure_kind: StructureKind,
    pub status: EntityStatus,
    pub source: EntitySource,
    pub is_locked: bool,
    pub is_enabled: bool,
    pub display_name: HashMap<String, String>,
    pub fields: Vec<FieldMetadata>,
    pub interfaces: Vec<EntityInterface>,
    pub parent_entity_id: Option<Uuid>,
    pub parent_foreign_key_field: Option<String>,
    pub cascade_delete: CascadePolicy,
    pub auto_cascade_save: bool,
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl EntityDefinition {
    pub fn new(namespace: impl Into<String>, entity_name: impl Into<String>, actor: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            entity_name: entity_name.into(),
            entity_route: String::new(),
            structure_kind: StructureKind::Single,
            status: EntityStatus::Draft,
            source: EntitySource::Custom,
            is_locked: false,
            is_enabled: true,
            display_name: HashMap::new(),
            fields: Vec::new(),
            interfaces: Vec::new(),
            parent_entity_id: None,
            parent_foreign_key_field: None,
            cascade_delete: CascadePolicy::Restrict,
            auto_cascade_save: true,
            order: 0,
            created_at: now,
            created_by: actor.to_string(),
            updated_at: now,
            updated_by: actor.to_string(),
        }
    }

    pub fn full_type_name(&self) -> String {
        format!("{}.{}", self.namespace, self.entity_name)
    }

    /// Physical table name: explicit route, or the pluralized entity name.
    pub fn table_name(&self) -> String {
        if self.entity_route.is_empty() {
            format!("{}s", self.entity_name).to_lowercase()
        } else {
            self.entity_route.to_lowercase()
        }
    }

    /// Localized display label with fallback: requested language, then "en",
    /// then any value, then the entity name itself.
    pub fn display_label(&self, lang: &str) -> String {
        self.display_name
            .get(lang)
            .or_else(|| self.display_name.get("en"))
            .or_else(|| self.display_name.values().next())
            .cloned()
            .unwrap_or_else(|| self.entity_name.clone())
    }

    pub fn has_interface(&self, kind: InterfaceKind) -> bool {
        self.interfaces
            .iter()
            .any(|i| i.kind == kind && i.is_enabled)
    }

    pub fn field(&self, property_name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.property_name == property_name)
    }

    /// Fields in emission order: sort order, then name for stability.
    pub fn ordered_fields(&self) -> Vec<&FieldMetadata> {
        let mut fields: Vec<&FieldMetadata> = self.fields.iter().collect();
        fields.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.property_name.cmp(&b.property_name))
        });
        fields
    }

    pub fn touch(&mut self, actor: &str) {
        self.updated_at = Utc::now();
        self.updated_by = actor.to_string();
    }

    fn mark_modified(&mut self) {
        if self.status == EntityStatus::Published {
            self.status = EntityStatus::Modified;
        }
    }

    pub fn validate_identifiers(&self) -> Result<()> {
        for name in [&self.namespace, &self.entity_name] {
            if !is_valid_identifier(name) {
                return Err(EngineError::Validation(format!(
                    "'{}' is not a valid identifier",
                    name
                )));
            }
        }
        if !self.entity_route.is_empty() && !is_valid_identifier(&self.entity_route) {
            return Err(EngineError::Validation(format!(
                "Route '{}' is not a valid identifier",
                self.entity_route
            )));
        }
        for field in &self.fields {
            if !is_valid_identifier(&field.property_name) {
                return Err(EngineError::Validation(format!(
                    "Field name '{}' is not a valid identifier",
                    field.property_name
                )));
            }
        }
        Ok(())
    }

    /// Rename the entity. Rejected once the entity has been published.
    pub fn rename(&mut self, namespace: &str, entity_name: &str) -> Result<()> {
        if self.status != EntityStatus::Draft {
            return Err(EngineError::Validation(format!(
                "Entity '{}' is published and cannot be renamed",
                self.full_type_name()
            )));
        }
        if !is_valid_identifier(namespace) || !is_valid_identifier(entity_name) {
            return Err(EngineError::Validation(format!(
                "'{}.{}' is not a valid type name",
                namespace, entity_name
            )));
        }
        self.namespace = namespace.to_string();
        self.entity_name = entity_name.to_string();
        Ok(())
    }

    /// Add or replace a field by property name. Publishing state is demoted
    /// to Modified so the change flows through publish_changes.
    pub fn upsert_field(&mut self, field: FieldMetadata) -> Result<()> {
        if !is_valid_identifier(&field.property_name) {
            return Err(EngineError::Validation(format!(
                "Field name '{}' is not a valid identifier",
                field.property_name
            )));
        }
        if let Some(existing) = self
            .fields
            .iter_mut()
            .find(|f| f.property_name == field.property_name)
        {
            *existing = field;
        } else {
            self.fields.push(field);
        }
        self.mark_modified();
        Ok(())
    }

    pub fn remove_field(&mut self, property_name: &str) -> Result<()> {
        if self.is_locked {
            return Err(EngineError::Validation(format!(
                "Entity '{}' is locked; fields cannot be removed",
                self.full_type_name()
            )));
        }
        let Some(idx) = self
            .fields
            .iter()
            .position(|f| f.property_name == property_name)
        else {
            return Err(EngineError::ColumnNotFound(
                property_name.to_string(),
                self.full_type_name(),
            ));
        };
        if self.fields[idx].source != FieldSource::Custom {
            return Err(EngineError::Validation(format!(
                "Field '{}' is system-managed and cannot be removed",
                property_name
            )));
        }
        self.fields.remove(idx);
        self.mark_modified();
        Ok(())
    }

    pub fn enable_interface(&mut self, kind: InterfaceKind) {
        if let Some(existing) = self.interfaces.iter_mut().find(|i| i.kind == kind) {
            existing.is_enabled = true;
        } else {
            self.interfaces.push(EntityInterface::new(kind));
        }
        self.mark_modified();
    }

    pub fn remove_interface(&mut self, kind: InterfaceKind) -> Result<()> {
        if self.is_locked {
            return Err(EngineError::Validation(format!(
                "Entity '{}' is locked; interfaces cannot be removed",
                self.full_type_name()
            )));
        }
        self.interfaces.retain(|i| i.kind != kind);
        self.fields
            .retain(|f| !(f.source == FieldSource::Interface && interface_owns_field(kind, &f.property_name)));
        self.mark_modified();
        Ok(())
    }

    /// Materialize the fields implied by the enabled interfaces, skipping
    /// property names the entity already declares. Interface fields sort
    /// ahead of custom fields.
    pub fn apply_interface_fields(&mut self) {
        let kinds: Vec<InterfaceKind> = self
            .interfaces
            .iter()
            .filter(|i| i.is_enabled)
            .map(|i| i.kind)
            .collect();
        for kind in kinds {
            for field in interface_fields(kind) {
                if self.field(&field.property_name).is_none() {
                    self.fields.push(field);
                }
            }
        }
    }
}

fn interface_owns_field(kind: InterfaceKind, property_name: &str) -> bool {
    interface_fields(kind)
        .iter()
        .any(|f| f.property_name == property_name)
}

/// Field templates for each capability interface.
pub fn interface_fields(kind: InterfaceKind) -> Vec<FieldMetadata> {
    let stamp = |f: FieldMetadata, order: i32| {
        f.with_source(FieldSource::Interface).with_sort_order(order)
    };
    match kind {
        InterfaceKind::Base => vec![
            stamp(FieldMetadata::new("Id", FieldDataType::Integer).required(), -100),
            stamp(
                FieldMetadata::new("IsDeleted", FieldDataType::Boolean)
                    .required()
                    .with_default("false"),
                -99,
            ),
            stamp(FieldMetadata::new("DeletedAt", FieldDataType::DateTime), -98),
            stamp(
                FieldMetadata::new("DeletedBy", FieldDataType::String).with_length(256),
                -97,
            ),
        ],
        InterfaceKind::Archive => vec![
            stamp(
                FieldMetadata::new("Code", FieldDataType::String)
                    .with_length(64)
                    .required()
                    .unique(),
                -89,
            ),
            stamp(
                FieldMetadata::new("Name", FieldDataType::String)
                    .with_length(256)
                    .required(),
                -88,
            ),
        ],
        InterfaceKind::Audit => vec![
            stamp(
                FieldMetadata::new("CreatedAt", FieldDataType::DateTime)
                    .required()
                    .with_default("NOW"),
                -79,
            ),
            stamp(
                FieldMetadata::new("CreatedBy", FieldDataType::String).with_length(256),
                -78,
            ),
            stamp(
                FieldMetadata::new("UpdatedAt", FieldDataType::DateTime)
                    .required()
                    .with_default("NOW"),
                -77,
            ),
            stamp(
                FieldMetadata::new("UpdatedBy", FieldDataType::String).with_length(256),
                -76,
            ),
            stamp(
                FieldMetadata::new("Version", FieldDataType::Integer)
                    .required()
                    .with_default("1"),
                -75,
            ),
        ],
        InterfaceKind::Version => vec![stamp(
            FieldMetadata::new("Version", FieldDataType::Integer)
                .required()
                .with_default("1"),
            -75,
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_defaults_to_plural() {
        let def = EntityDefinition::new("Custom", "Product", "admin");
        assert_eq!(def.table_name(), "products");
        assert_eq!(def.full_type_name(), "Custom.Product");
    }

    #[test]
    fn test_field_edit_demotes_published_entity() {
        let mut def = EntityDefinition::new("Custom", "Product", "admin");
        def.status = EntityStatus::Published;
        def.upsert_field(FieldMetadata::new("Name", FieldDataType::String))
            .unwrap();
        assert_eq!(def.status, EntityStatus::Modified);
    }

    #[test]
    fn test_locked_entity_rejects_field_removal() {
        let mut def = EntityDefinition::new("Custom", "Product", "admin");
        def.upsert_field(FieldMetadata::new("Name", FieldDataType::String))
            .unwrap();
        def.is_locked = true;
        assert!(def.remove_field("Name").is_err());
    }

    #[test]
    fn test_interface_fields_are_deduplicated() {
        let mut def = EntityDefinition::new("Custom", "Product", "admin");
        def.enable_interface(InterfaceKind::Base);
        def.enable_interface(InterfaceKind::Version);
        def.enable_interface(InterfaceKind::Audit);
        def.apply_interface_fields();
        let versions = def
            .fields
            .iter()
            .filter(|f| f.property_name == "Version")
            .count();
        assert_eq!(versions, 1);
        assert!(def.field("Id").is_some());
        assert!(def.field("IsDeleted").is_some());
    }

    #[test]
    fn test_rename_rejected_after_publish() {
        let mut def = EntityDefinition::new("Custom", "Product", "admin");
        def.status = EntityStatus::Published;
        assert!(def.rename("Custom", "Item").is_err());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("Product_2"));
        assert!(!is_valid_identifier("2Product"));
        assert!(!is_valid_identifier("drop table"));
    }
}
