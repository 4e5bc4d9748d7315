//! Facade wiring the full pipeline together: metadata store, compiler and
//! registry, DDL generation and execution over the in-memory backend,
//! publishing, persistence and aggregates.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::aggregate::AggregateService;
use crate::compiler::{EntityCompiler, TypeRegistry};
use crate::core::Result;
use crate::ddl::{DdlExecutor, PostgresDdlGenerator};
use crate::metadata::{EntityDefinition, EnumDefinition, MetadataStore};
use crate::persistence::PersistenceService;
use crate::publish::{
    EntityLockService, PublishResult, PublishingService, RecordingMenuRegistrar,
    RecordingTemplateProvisioner, WithdrawMode,
};
use crate::storage::{MemoryBackend, SchemaBackend};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub withdraw_mode: WithdrawMode,
    pub default_namespace: String,
    pub system_actor: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            withdraw_mode: WithdrawMode::Logical,
            default_namespace: "Custom".to_string(),
            system_actor: "system".to_string(),
        }
    }
}

/// The engine facade. Owns every service; callers go through the typed
/// accessors or the lifecycle shortcuts below.
pub struct EntityEngine {
    config: EngineConfig,
    store: MetadataStore,
    registry: Arc<TypeRegistry>,
    backend: Arc<dyn SchemaBackend>,
    executor: Arc<DdlExecutor>,
    compiler: Arc<EntityCompiler>,
    publishing: PublishingService,
    persistence: Arc<PersistenceService>,
    aggregates: AggregateService,
    templates: Arc<RecordingTemplateProvisioner>,
    menus: Arc<RecordingMenuRegistrar>,
}

impl EntityEngine {
    pub fn new(config: EngineConfig) -> Self {
        let store = MetadataStore::new();
        let registry = Arc::new(TypeRegistry::new());
        let backend: Arc<dyn SchemaBackend> = Arc::new(MemoryBackend::new());
        let executor = Arc::new(DdlExecutor::new(backend.clone(), store.clone()));
        let compiler = Arc::new(EntityCompiler::new(registry.clone(), store.clone()));
        let templates = Arc::new(RecordingTemplateProvisioner::new());
        let menus = Arc::new(RecordingMenuRegistrar::new());
        let publishing = PublishingService::new(
            store.clone(),
            executor.clone(),
            Arc::new(PostgresDdlGenerator),
            compiler.clone(),
            registry.clone(),
            Arc::new(EntityLockService::new()),
            templates.clone(),
            menus.clone(),
            config.withdraw_mode,
        );
        let persistence = Arc::new(PersistenceService::new(registry.clone(), backend.clone()));
        let aggregates = AggregateService::new(store.clone(), persistence.clone());

        info!(namespace = %config.default_namespace, "entity engine initialized");
        Self {
            config,
            store,
            registry,
            backend,
            executor,
            compiler,
            publishing,
            persistence,
            aggregates,
            templates,
            menus,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<dyn SchemaBackend> {
        &self.backend
    }

    pub fn ddl(&self) -> &Arc<DdlExecutor> {
        &self.executor
    }

    pub fn compiler(&self) -> &Arc<EntityCompiler> {
        &self.compiler
    }

    pub fn publishing(&self) -> &PublishingService {
        &self.publishing
    }

    pub fn data(&self) -> &Arc<PersistenceService> {
        &self.persistence
    }

    pub fn aggregates(&self) -> &AggregateService {
        &self.aggregates
    }

    pub fn templates(&self) -> &Arc<RecordingTemplateProvisioner> {
        &self.templates
    }

    pub fn menus(&self) -> &Arc<RecordingMenuRegistrar> {
        &self.menus
    }

    /// New Draft definition in the configured default namespace.
    pub fn new_entity(&self, entity_name: &str, actor: &str) -> EntityDefinition {
        EntityDefinition::new(self.config.default_namespace.clone(), entity_name, actor)
    }

    pub async fn define_entity(&self, def: EntityDefinition) -> Result<Uuid> {
        self.store.insert_entity(def).await
    }

    pub async fn define_enum(&self, def: EnumDefinition) -> Uuid {
        self.store.insert_enum(def).await
    }

    pub async fn publish(&self, entity_id: Uuid, actor: &str) -> Result<PublishResult> {
        self.publishing.publish_new(entity_id, actor).await
    }

    pub async fn publish_changes(&self, entity_id: Uuid, actor: &str) -> Result<PublishResult> {
        self.publishing.publish_changes(entity_id, actor).await
    }

    pub async fn withdraw(&self, entity_id: Uuid, actor: &str) -> Result<PublishResult> {
        self.publishing.withdraw(entity_id, actor).await
    }

    pub async fn reconcile(&self, entity_id: Uuid, actor: &str) -> Result<PublishResult> {
        self.publishing.reconcile(entity_id, actor).await
    }
}

impl Default for EntityEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
