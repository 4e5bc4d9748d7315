use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::core::{EngineError, Result, RowSchema, Value};
use crate::metadata::ForeignKeyAction;

/// Resolved lookup edge on a compiled type.
#[derive(Debug, Clone)]
pub struct LookupBinding {
    pub field: String,
    pub target_type: String,
    pub on_delete: ForeignKeyAction,
}

/// Allowed-key check for a compiled enum field.
#[derive(Debug, Clone)]
pub struct EnumCheck {
    pub keys: Vec<String>,
    pub multi: bool,
}

impl EnumCheck {
    fn accepts(&self, stored: &str) -> bool {
        if self.multi {
            stored
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .all(|k| self.keys.iter().any(|key| key == k))
        } else {
            self.keys.iter().any(|key| key == stored)
        }
    }
}

/// A compiled entity type: the runtime stand-in for a loaded class.
/// Carries the physical row schema, the field-level validator, and the
/// capability flags the persistence layer keys off.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub full_name: String,
    pub table_name: String,
    pub schema: RowSchema,
    pub soft_delete: bool,
    pub audited: bool,
    pub lookups: Vec<LookupBinding>,
    pub enums: HashMap<String, EnumCheck>,
}

impl EntityType {
    /// Validate one payload cell against the column and any enum check.
    pub fn validate_cell(&self, field: &str, value: &Value) -> Result<()> {
        let column = self
            .schema
            .get_column(field)
            .ok_or_else(|| EngineError::ColumnNotFound(field.to_string(), self.full_name.clone()))?;
        column.validate(value)?;
        if let (Some(check), Value::Text(stored)) = (self.enums.get(field), value)
            && !check.accepts(stored)
        {
            return Err(EngineError::Validation(format!(
                "'{}' is not a member of the enum for field '{}'",
                stored, field
            )));
        }
        Ok(())
    }
}

/// Registry of loaded entity types. The map is replaced wholesale on every
/// registration (copy-on-write), so readers holding an old snapshot or an
/// old `Arc<EntityType>` keep working mid-operation while new lookups see
/// the swapped-in generation.
pub struct TypeRegistry {
    types: RwLock<Arc<HashMap<String, Arc<EntityType>>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, Arc<EntityType>>> {
        self.types
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn get(&self, full_name: &str) -> Option<Arc<EntityType>> {
        self.snapshot().get(full_name).cloned()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.snapshot().contains_key(full_name)
    }

    pub fn loaded_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    /// Swap the given types in atomically. Existing entries with other
    /// names are preserved.
    pub fn register_all(&self, types: Vec<EntityType>) {
        let mut guard = self
            .types
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = (**guard).clone();
        for entity_type in types {
            next.insert(entity_type.full_name.clone(), Arc::new(entity_type));
        }
        *guard = Arc::new(next);
    }

    pub fn unregister(&self, full_name: &str) -> bool {
        let mut guard = self
            .types
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !guard.contains_key(full_name) {
            return false;
        }
        let mut next = (**guard).clone();
        next.remove(full_name);
        *guard = Arc::new(next);
        true
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};

    fn sample_type(name: &str, text_limit: u32) -> EntityType {
        EntityType {
            full_name: name.to_string(),
            table_name: "samples".to_string(),
            schema: RowSchema::new(vec![
                Column::new("Id", DataType::Integer).primary_key(),
                Column::new("Name", DataType::Text).with_max_length(text_limit),
            ]),
            soft_delete: false,
            audited: false,
            lookups: Vec::new(),
            enums: HashMap::new(),
        }
    }

    #[test]
    fn test_old_handle_survives_swap() {
        let registry = TypeRegistry::new();
        registry.register_all(vec![sample_type("Custom.Product", 10)]);
        let old = registry.get("Custom.Product").unwrap();

        registry.register_all(vec![sample_type("Custom.Product", 3)]);
        let new = registry.get("Custom.Product").unwrap();

        // In-flight holders of the old generation still validate by its rules.
        assert!(old.validate_cell("Name", &Value::Text("abcdef".into())).is_ok());
        assert!(new.validate_cell("Name", &Value::Text("abcdef".into())).is_err());
    }

    #[test]
    fn test_unregister() {
        let registry = TypeRegistry::new();
        registry.register_all(vec![sample_type("Custom.Product", 10)]);
        assert!(registry.unregister("Custom.Product"));
        assert!(!registry.unregister("Custom.Product"));
        assert!(registry.get("Custom.Product").is_none());
    }

    #[test]
    fn test_enum_check() {
        let mut entity_type = sample_type("Custom.Product", 100);
        entity_type.enums.insert(
            "Name".to_string(),
            EnumCheck { keys: vec!["A".into(), "B".into()], multi: false },
        );
        assert!(entity_type.validate_cell("Name", &Value::Text("A".into())).is_ok());
        assert!(entity_type.validate_cell("Name", &Value::Text("C".into())).is_err());
    }
}
