use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::{EngineError, Result};
use crate::metadata::ddl_script::{DdlScript, DdlStatus};
use crate::metadata::entity::EntityDefinition;
use crate::metadata::enums::EnumDefinition;

#[derive(Default)]
struct StoreState {
    entities: HashMap<Uuid, EntityDefinition>,
    enums: HashMap<Uuid, EnumDefinition>,
    scripts: Vec<DdlScript>,
}

/// In-memory metadata tables: entity definitions, enum definitions and the
/// DDL execution history. Cheap to clone; all handles share one state.
#[derive(Clone, Default)]
pub struct MetadataStore {
    state: Arc<RwLock<StoreState>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_entity(&self, def: EntityDefinition) -> Result<Uuid> {
        def.validate_identifiers()?;
        let mut state = self.state.write().await;
        let full_name = def.full_type_name();
        if state
            .entities
            .values()
            .any(|e| e.full_type_name() == full_name)
        {
            return Err(EngineError::Validation(format!(
                "Entity '{}' already exists",
                full_name
            )));
        }
        let id = def.id;
        state.entities.insert(id, def);
        Ok(id)
    }

    /// Replace an existing definition. Uniqueness of the full type name is
    /// re-checked against all other entities.
    pub async fn save_entity(&self, def: EntityDefinition) -> Result<()> {
        def.validate_identifiers()?;
        let mut state = self.state.write().await;
        if !state.entities.contains_key(&def.id) {
            return Err(EngineError::EntityNotFound(def.full_type_name()));
        }
        let full_name = def.full_type_name();
        if state
            .entities
            .values()
            .any(|e| e.id != def.id && e.full_type_name() == full_name)
        {
            return Err(EngineError::Validation(format!(
                "Entity '{}' already exists",
                full_name
            )));
        }
        state.entities.insert(def.id, def);
        Ok(())
    }

    pub async fn entity(&self, id: Uuid) -> Option<EntityDefinition> {
        self.state.read().await.entities.get(&id).cloned()
    }

    pub async fn require_entity(&self, id: Uuid) -> Result<EntityDefinition> {
        self.entity(id)
            .await
            .ok_or_else(|| EngineError::EntityNotFound(id.to_string()))
    }

    pub async fn find_by_type_name(&self, full_type_name: &str) -> Option<EntityDefinition> {
        self.state
            .read()
            .await
            .entities
            .values()
            .find(|e| e.full_type_name() == full_type_name)
            .cloned()
    }

    /// Find by bare entity name (no namespace); lookup fields reference
    /// entities this way.
    pub async fn find_by_entity_name(&self, entity_name: &str) -> Option<EntityDefinition> {
        self.state
            .read()
            .await
            .entities
            .values()
            .find(|e| e.entity_name == entity_name)
            .cloned()
    }

    pub async fn list_entities(&self) -> Vec<EntityDefinition> {
        self.state.read().await.entities.values().cloned().collect()
    }

    /// Detail definitions of an aggregate head, in declared order.
    pub async fn children_of(&self, parent_id: Uuid) -> Vec<EntityDefinition> {
        let state = self.state.read().await;
        let mut children: Vec<EntityDefinition> = state
            .entities
            .values()
            .filter(|e| e.parent_entity_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by_key(|e| e.order);
        children
    }

    pub async fn insert_enum(&self, def: EnumDefinition) -> Uuid {
        let id = def.id;
        self.state.write().await.enums.insert(id, def);
        id
    }

    pub async fn enum_def(&self, id: Uuid) -> Option<EnumDefinition> {
        self.state.read().await.enums.get(&id).cloned()
    }

    pub async fn enum_by_name(&self, name: &str) -> Option<EnumDefinition> {
        self.state
            .read()
            .await
            .enums
            .values()
            .find(|e| e.name == name)
            .cloned()
    }

    pub async fn record_script(&self, script: DdlScript) {
        self.state.write().await.scripts.push(script);
    }

    pub async fn record_scripts(&self, scripts: Vec<DdlScript>) {
        self.state.write().await.scripts.extend(scripts);
    }

    pub async fn script(&self, id: Uuid) -> Option<DdlScript> {
        self.state
            .read()
            .await
            .scripts
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub async fn mark_rolled_back(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let script = state
            .scripts
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(EngineError::ScriptNotFound(id))?;
        script.status = DdlStatus::RolledBack;
        Ok(())
    }

    pub async fn history(&self, entity_id: Uuid) -> Vec<DdlScript> {
        self.state
            .read()
            .await
            .scripts
            .iter()
            .filter(|s| s.entity_definition_id == entity_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_type_name_uniqueness() {
        let store = MetadataStore::new();
        let a = EntityDefinition::new("Custom", "Product", "admin");
        let b = EntityDefinition::new("Custom", "Product", "admin");
        store.insert_entity(a).await.unwrap();
        assert!(store.insert_entity(b).await.is_err());
    }

    #[tokio::test]
    async fn test_children_ordered() {
        let store = MetadataStore::new();
        let head = EntityDefinition::new("Custom", "Order", "admin");
        let head_id = head.id;
        store.insert_entity(head).await.unwrap();

        let mut line = EntityDefinition::new("Custom", "OrderLine", "admin");
        line.parent_entity_id = Some(head_id);
        line.order = 2;
        let mut note = EntityDefinition::new("Custom", "OrderNote", "admin");
        note.parent_entity_id = Some(head_id);
        note.order = 1;
        store.insert_entity(line).await.unwrap();
        store.insert_entity(note).await.unwrap();

        let children = store.children_of(head_id).await;
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].entity_name, "OrderNote");
    }
}
