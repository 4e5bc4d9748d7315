use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_recursion::async_recursion;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codegen::SourceGenerator;
use crate::compiler::{CompileOutcome, EntityCompiler, TypeRegistry};
use crate::core::Result;
use crate::ddl::{ChangeAnalysis, DdlExecutor, DdlGenerator};
use crate::metadata::{
    DdlKind, DdlStatus, EntityDefinition, EntityStatus, FieldDataType, ForeignKeyAction,
    MetadataStore,
};
use crate::publish::collaborators::{MenuRegistrar, TemplateProvisioner};
use crate::publish::lock::EntityLockService;

/// Whether withdrawing an entity keeps or drops its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WithdrawMode {
    #[default]
    Logical,
    Physical,
}

/// Outcome of a structural operation. Domain validation failures are
/// results, not errors; `post_publish_errors` reports the known
/// partial-failure window after the schema change committed.
#[derive(Debug, Clone)]
pub struct PublishResult {
    pub entity_id: Uuid,
    pub success: bool,
    pub error_message: Option<String>,
    pub ddl_script: Option<String>,
    pub script_id: Option<Uuid>,
    pub published_dependencies: Vec<Uuid>,
    pub post_publish_errors: Vec<String>,
}

impl PublishResult {
    fn failure(entity_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            entity_id,
            success: false,
            error_message: Some(message.into()),
            ddl_script: None,
            script_id: None,
            published_dependencies: Vec::new(),
            post_publish_errors: Vec::new(),
        }
    }

    fn success(entity_id: Uuid) -> Self {
        Self {
            entity_id,
            success: true,
            error_message: None,
            ddl_script: None,
            script_id: None,
            published_dependencies: Vec::new(),
            post_publish_errors: Vec::new(),
        }
    }
}

/// Drives the entity lifecycle: Draft → Published → Modified → Published,
/// plus withdraw. Owns the validation gate, cascading dependency publish
/// and the post-publish compile/template/menu steps.
pub struct PublishingService {
    store: MetadataStore,
    executor: Arc<DdlExecutor>,
    generator: Arc<dyn DdlGenerator>,
    compiler: Arc<EntityCompiler>,
    registry: Arc<TypeRegistry>,
    locks: Arc<EntityLockService>,
    templates: Arc<dyn TemplateProvisioner>,
    menus: Arc<dyn MenuRegistrar>,
    withdraw_mode: WithdrawMode,
}

impl PublishingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: MetadataStore,
        executor: Arc<DdlExecutor>,
        generator: Arc<dyn DdlGenerator>,
        compiler: Arc<EntityCompiler>,
        registry: Arc<TypeRegistry>,
        locks: Arc<EntityLockService>,
        templates: Arc<dyn TemplateProvisioner>,
        menus: Arc<dyn MenuRegistrar>,
        withdraw_mode: WithdrawMode,
    ) -> Self {
        Self {
            store,
            executor,
            generator,
            compiler,
            registry,
            locks,
            templates,
            menus,
            withdraw_mode,
        }
    }

    /// Publish a Draft entity: validate, publish Draft lookup dependencies
    /// first, create the table, then flip to Published and run the
    /// post-publish steps.
    pub async fn publish_new(&self, entity_id: Uuid, actor: &str) -> Result<PublishResult> {
        // Lock the whole cascade up front, in id order, so two overlapping
        // cascades cannot deadlock on each other's entities.
        let closure = self.draft_closure(entity_id).await;
        let _guards = self.locks.acquire_all(&closure).await?;

        let mut visited = HashSet::new();
        self.publish_inner(entity_id, actor, &mut visited).await
    }

    /// The entity plus every Draft definition reachable through lookup
    /// fields, i.e. everything a cascade publish may touch.
    async fn draft_closure(&self, entity_id: Uuid) -> Vec<Uuid> {
        let mut seen = HashSet::from([entity_id]);
        let mut queue = vec![entity_id];
        while let Some(id) = queue.pop() {
            let Some(entity) = self.store.entity(id).await else {
                continue;
            };
            for field in &entity.fields {
                let Some(target) = &field.lookup_entity_name else {
                    continue;
                };
                if let Some(dep) = self.store.find_by_entity_name(target).await
                    && dep.status == EntityStatus::Draft
                    && seen.insert(dep.id)
                {
                    queue.push(dep.id);
                }
            }
        }
        seen.into_iter().collect()
    }

    #[async_recursion]
    async fn publish_inner(
        &self,
        entity_id: Uuid,
        actor: &str,
        visited: &mut HashSet<Uuid>,
    ) -> Result<PublishResult> {
        if visited.contains(&entity_id) {
            // A diamond reaches the same dependency twice; a revisit is
            // only a cycle while the entity is still waiting in Draft.
            if let Some(revisited) = self.store.entity(entity_id).await
                && revisited.status == EntityStatus::Published
            {
                return Ok(PublishResult::success(entity_id));
            }
            return Ok(PublishResult::failure(
                entity_id,
                format!(
                    "Cyclic lookup dependency detected involving entity '{}'",
                    entity_id
                ),
            ));
        }
        visited.insert(entity_id);

        let Some(mut entity) = self.store.entity(entity_id).await else {
            return Ok(PublishResult::failure(
                entity_id,
                format!("Entity definition '{}' not found", entity_id),
            ));
        };

        if entity.status != EntityStatus::Draft {
            return Ok(PublishResult::failure(
                entity_id,
                format!(
                    "Entity '{}' has status {:?}, expected Draft",
                    entity.full_type_name(),
                    entity.status
                ),
            ));
        }

        let table = entity.table_name();
        if self.executor.table_exists(&table).await {
            return Ok(PublishResult::failure(
                entity_id,
                format!("Table '{}' already exists", table),
            ));
        }

        if let Some(message) = self.validate_enum_fields(&entity).await {
            return Ok(PublishResult::failure(entity_id, message));
        }

        // Resolve lookup targets; collect Draft dependencies for cascade.
        let mut missing = Vec::new();
        let mut draft_dependencies = Vec::new();
        let mut lookup_tables = HashMap::new();
        for field in &entity.fields {
            let Some(target) = &field.lookup_entity_name else {
                continue;
            };
            match self.store.find_by_entity_name(target).await {
                None => missing.push(target.clone()),
                Some(dep) => {
                    lookup_tables.insert(target.clone(), dep.table_name());
                    if dep.status == EntityStatus::Draft
                        && dep.id != entity_id
                        && !draft_dependencies.contains(&dep.id)
                    {
                        draft_dependencies.push(dep.id);
                    }
                }
            }
        }
        if !missing.is_empty() {
            return Ok(PublishResult::failure(
                entity_id,
                format!("Lookup referenced entities not found: {}", missing.join(", ")),
            ));
        }

        for field in &entity.fields {
            if field.is_lookup()
                && field.foreign_key_action == ForeignKeyAction::SetNull
                && field.required
            {
                return Ok(PublishResult::failure(
                    entity_id,
                    format!(
                        "Field '{}' uses SetNull and cannot be required",
                        field.property_name
                    ),
                ));
            }
        }

        let mut published_dependencies = Vec::new();
        for dep_id in draft_dependencies {
            if let Some(dep) = self.store.entity(dep_id).await
                && dep.status != EntityStatus::Draft
            {
                // Published earlier in this cascade through another path.
                continue;
            }
            let dep_result = self.publish_inner(dep_id, actor, visited).await?;
            if !dep_result.success {
                return Ok(PublishResult::failure(
                    entity_id,
                    format!(
                        "Dependency '{}' could not be published: {}",
                        dep_id,
                        dep_result.error_message.unwrap_or_default()
                    ),
                ));
            }
            published_dependencies.push(dep_id);
            published_dependencies.extend(dep_result.published_dependencies);
        }

        entity.apply_interface_fields();
        let sql = self.generator.create_table_script(&entity, &lookup_tables);
        let record = self
            .executor
            .execute(entity.id, DdlKind::Create, sql.clone(), actor)
            .await;
        if record.status != DdlStatus::Success {
            // Entity stays Draft; nothing below runs.
            let mut result = PublishResult::failure(
                entity_id,
                record.error_message.clone().unwrap_or_else(|| "DDL execution failed".into()),
            );
            result.ddl_script = Some(sql);
            result.script_id = Some(record.id);
            return Ok(result);
        }

        entity.status = EntityStatus::Published;
        entity.is_locked = true;
        entity.touch(actor);
        self.store.save_entity(entity.clone()).await?;
        info!(entity = %entity.full_type_name(), "entity published");

        let mut result = PublishResult::success(entity_id);
        result.ddl_script = Some(sql);
        result.script_id = Some(record.id);
        result.published_dependencies = published_dependencies;
        result.post_publish_errors = self.post_publish(&entity, actor, false).await;
        Ok(result)
    }

    /// Apply metadata changes to an already published entity.
    pub async fn publish_changes(&self, entity_id: Uuid, actor: &str) -> Result<PublishResult> {
        let _guard = self.locks.acquire(entity_id).await?;

        let Some(mut entity) = self.store.entity(entity_id).await else {
            return Ok(PublishResult::failure(
                entity_id,
                format!("Entity definition '{}' not found", entity_id),
            ));
        };
        if entity.status != EntityStatus::Modified {
            return Ok(PublishResult::failure(
                entity_id,
                format!(
                    "Entity '{}' has status {:?}, expected Modified",
                    entity.full_type_name(),
                    entity.status
                ),
            ));
        }
        let table = entity.table_name();
        if !self.executor.table_exists(&table).await {
            return Ok(PublishResult::failure(
                entity_id,
                format!("Table '{}' does not exist", table),
            ));
        }

        entity.apply_interface_fields();
        let live = self.executor.table_columns(&table).await?;
        let analysis = ChangeAnalysis::diff(&entity, &live);

        if analysis.has_destructive_changes() && entity.is_locked {
            return Ok(PublishResult::failure(
                entity_id,
                format!(
                    "Entity '{}' is locked; destructive changes (length decreases or removed columns) are not allowed",
                    entity.full_type_name()
                ),
            ));
        }
        if !analysis.has_changes() {
            return Ok(PublishResult::failure(entity_id, "No changes detected"));
        }

        let mut lookup_tables = HashMap::new();
        for field in &analysis.new_fields {
            if let Some(target) = &field.lookup_entity_name {
                match self.store.find_by_entity_name(target).await {
                    Some(dep) => {
                        lookup_tables.insert(target.clone(), dep.table_name());
                    }
                    None => {
                        return Ok(PublishResult::failure(
                            entity_id,
                            format!("Lookup referenced entities not found: {}", target),
                        ));
                    }
                }
            }
        }

        let sql = self
            .generator
            .alter_table_script(&entity, &analysis, &lookup_tables);
        let record = self
            .executor
            .execute(entity.id, DdlKind::Alter, sql.clone(), actor)
            .await;
        if record.status != DdlStatus::Success {
            let mut result = PublishResult::failure(
                entity_id,
                record.error_message.clone().unwrap_or_else(|| "DDL execution failed".into()),
            );
            result.ddl_script = Some(sql);
            result.script_id = Some(record.id);
            return Ok(result);
        }

        entity.status = EntityStatus::Published;
        entity.touch(actor);
        self.store.save_entity(entity.clone()).await?;
        info!(entity = %entity.full_type_name(), "entity changes published");

        let mut result = PublishResult::success(entity_id);
        result.ddl_script = Some(sql);
        result.script_id = Some(record.id);
        result.post_publish_errors = self.post_publish(&entity, actor, false).await;
        Ok(result)
    }

    /// Deactivate a published entity. Logical mode keeps the table;
    /// Physical mode drops it and unregisters the type.
    pub async fn withdraw(&self, entity_id: Uuid, actor: &str) -> Result<PublishResult> {
        let _guard = self.locks.acquire(entity_id).await?;

        let Some(mut entity) = self.store.entity(entity_id).await else {
            return Ok(PublishResult::failure(
                entity_id,
                format!("Entity definition '{}' not found", entity_id),
            ));
        };
        if !matches!(entity.status, EntityStatus::Published | EntityStatus::Modified) {
            return Ok(PublishResult::failure(
                entity_id,
                format!(
                    "Entity '{}' has status {:?} and cannot be withdrawn",
                    entity.full_type_name(),
                    entity.status
                ),
            ));
        }

        let mut result = PublishResult::success(entity_id);
        if self.withdraw_mode == WithdrawMode::Physical {
            let sql = self.generator.drop_table_script(&entity);
            let record = self
                .executor
                .execute(entity.id, DdlKind::Drop, sql.clone(), actor)
                .await;
            result.ddl_script = Some(sql);
            result.script_id = Some(record.id);
            if record.status != DdlStatus::Success {
                result.success = false;
                result.error_message = record.error_message.clone();
                return Ok(result);
            }
            self.registry.unregister(&entity.full_type_name());
            entity.is_locked = false;
        }

        entity.is_enabled = false;
        entity.touch(actor);
        self.store.save_entity(entity).await?;
        info!(entity = %entity_id, mode = ?self.withdraw_mode, "entity withdrawn");
        Ok(result)
    }

    /// Re-run the post-publish steps (compile, templates, menu) for a
    /// Published entity without touching the schema. Heals the partial
    /// window left when a step failed after the DDL committed.
    pub async fn reconcile(&self, entity_id: Uuid, actor: &str) -> Result<PublishResult> {
        let Some(entity) = self.store.entity(entity_id).await else {
            return Ok(PublishResult::failure(
                entity_id,
                format!("Entity definition '{}' not found", entity_id),
            ));
        };
        if entity.status != EntityStatus::Published {
            return Ok(PublishResult::failure(
                entity_id,
                format!(
                    "Entity '{}' has status {:?}, expected Published",
                    entity.full_type_name(),
                    entity.status
                ),
            ));
        }

        let errors = self.post_publish(&entity, actor, false).await;
        let mut result = PublishResult::success(entity_id);
        if !errors.is_empty() {
            result.success = false;
            result.error_message = Some(errors.join("; "));
        }
        result.post_publish_errors = errors;
        Ok(result)
    }

    async fn validate_enum_fields(&self, entity: &EntityDefinition) -> Option<String> {
        for field in &entity.fields {
            if field.data_type != FieldDataType::Enum {
                continue;
            }
            let Some(enum_id) = field.enum_definition_id else {
                return Some(format!(
                    "Field '{}' is missing its enum reference",
                    field.property_name
                ));
            };
            match self.store.enum_def(enum_id).await {
                None => {
                    return Some(format!("Enum definition '{}' not found", enum_id));
                }
                Some(def) if !def.is_enabled => {
                    return Some(format!("Enum definition '{}' is disabled", def.name));
                }
                Some(_) => {}
            }
        }
        None
    }

    /// Compile the entity type and provision templates and menu. Failures
    /// are collected, not propagated: the publish itself already committed.
    async fn post_publish(&self, entity: &EntityDefinition, actor: &str, force: bool) -> Vec<String> {
        let mut errors = Vec::new();

        let outcome = self.compile_entity(entity).await;
        if !outcome.success {
            warn!(entity = %entity.full_type_name(), "type compilation failed after publish");
            errors.push(format!(
                "Compilation failed: {}",
                outcome
                    .diagnostics
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            ));
        }

        if let Err(e) = self.templates.ensure_templates(entity, actor, force).await {
            errors.push(format!("Template provisioning failed: {}", e));
        }
        if let Err(e) = self.menus.register_entity_menu(entity, actor).await {
            errors.push(format!("Menu registration failed: {}", e));
        }
        errors
    }

    async fn compile_entity(&self, entity: &EntityDefinition) -> CompileOutcome {
        let children = self.store.children_of(entity.id).await;

        let mut enum_names = HashMap::new();
        for field in entity.fields.iter().chain(children.iter().flat_map(|c| c.fields.iter())) {
            if let Some(enum_id) = field.enum_definition_id
                && let Some(def) = self.store.enum_def(enum_id).await
            {
                enum_names.insert(enum_id, def.name);
            }
        }

        let source = SourceGenerator::unit_source(entity, &children, &enum_names);
        self.compiler.compile(&source, &entity.full_type_name()).await
    }
}
