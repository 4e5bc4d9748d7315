use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::Result;
use crate::metadata::EntityDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateUsage {
    List,
    Detail,
    Edit,
    Create,
}

impl TemplateUsage {
    pub const ALL: [TemplateUsage; 4] = [Self::List, Self::Detail, Self::Edit, Self::Create];
}

#[derive(Debug, Clone)]
pub struct TemplateHandle {
    pub usage: TemplateUsage,
    pub template_id: Uuid,
    pub created: bool,
}

/// Supplies the standard UI templates for a published entity. Publishing
/// calls this after the schema is live; implementations must be idempotent
/// when `force` is false.
#[async_trait]
pub trait TemplateProvisioner: Send + Sync {
    async fn ensure_templates(
        &self,
        entity: &EntityDefinition,
        actor: &str,
        force: bool,
    ) -> Result<Vec<TemplateHandle>>;
}

/// Registers a published entity in the navigation menu.
#[async_trait]
pub trait MenuRegistrar: Send + Sync {
    async fn register_entity_menu(&self, entity: &EntityDefinition, actor: &str) -> Result<()>;
}

/// In-memory provisioner: hands out one template per usage and reuses them
/// on later calls unless forced.
#[derive(Default)]
pub struct RecordingTemplateProvisioner {
    provisioned: Mutex<HashMap<Uuid, Vec<TemplateHandle>>>,
}

impl RecordingTemplateProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn templates_for(&self, entity_id: Uuid) -> Vec<TemplateHandle> {
        self.provisioned
            .lock()
            .map(|map| map.get(&entity_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TemplateProvisioner for RecordingTemplateProvisioner {
    async fn ensure_templates(
        &self,
        entity: &EntityDefinition,
        _actor: &str,
        force: bool,
    ) -> Result<Vec<TemplateHandle>> {
        let mut map = self.provisioned.lock()?;
        if let Some(existing) = map.get(&entity.id)
            && !force
        {
            return Ok(existing
                .iter()
                .map(|h| TemplateHandle { created: false, ..h.clone() })
                .collect());
        }
        let handles: Vec<TemplateHandle> = TemplateUsage::ALL
            .iter()
            .map(|usage| TemplateHandle {
                usage: *usage,
                template_id: Uuid::new_v4(),
                created: true,
            })
            .collect();
        map.insert(entity.id, handles.clone());
        Ok(handles)
    }
}

/// In-memory menu registrar; registration is idempotent per entity.
#[derive(Default)]
pub struct RecordingMenuRegistrar {
    entries: Mutex<HashMap<Uuid, String>>,
}

impl RecordingMenuRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, entity_id: Uuid) -> bool {
        self.entries
            .lock()
            .map(|map| map.contains_key(&entity_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl MenuRegistrar for RecordingMenuRegistrar {
    async fn register_entity_menu(&self, entity: &EntityDefinition, _actor: &str) -> Result<()> {
        self.entries
            .lock()?
            .insert(entity.id, entity.display_label("en"));
        Ok(())
    }
}
