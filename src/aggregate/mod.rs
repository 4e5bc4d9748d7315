//! Head/detail aggregate operations. The aggregate shape mirrors the
//! metadata parent/child graph: detail sets are the definitions whose
//! `parent_entity_id` points at the head, ordered by `order`.

use std::sync::Arc;

use async_recursion::async_recursion;
use tracing::warn;

use crate::core::{EngineError, Result};
use crate::metadata::{CascadePolicy, EntityDefinition, MetadataStore};
use crate::persistence::{FilterCondition, FilterOperator, JsonMap, PersistenceService, QueryOptions};

/// One detail collection of an aggregate, keyed by the child's full type
/// name.
#[derive(Debug, Clone, Default)]
pub struct DetailRows {
    pub entity_type: String,
    pub rows: Vec<DetailEntry>,
}

/// A detail row is either a flat record or, for grandchild structures, a
/// nested aggregate of its own.
#[derive(Debug, Clone)]
pub enum DetailEntry {
    Record(JsonMap),
    Nested(Aggregate),
}

#[derive(Debug, Clone)]
pub struct Aggregate {
    pub head_type: String,
    pub head: JsonMap,
    pub details: Vec<DetailRows>,
}

impl Aggregate {
    pub fn new(head_type: impl Into<String>, head: JsonMap) -> Self {
        Self { head_type: head_type.into(), head, details: Vec::new() }
    }

    pub fn with_details(mut self, details: DetailRows) -> Self {
        self.details.push(details);
        self
    }

    pub fn head_id(&self) -> Option<i64> {
        self.head.get("Id").and_then(|v| v.as_i64()).filter(|id| *id > 0)
    }
}

pub struct AggregateService {
    store: MetadataStore,
    persistence: Arc<PersistenceService>,
}

impl AggregateService {
    pub fn new(store: MetadataStore, persistence: Arc<PersistenceService>) -> Self {
        Self { store, persistence }
    }

    /// Save the head first, then every detail row with the parent foreign
    /// key stamped. Detail sets whose definition opted out of cascade save
    /// are skipped. Returns the head id.
    #[async_recursion]
    pub async fn save(&self, aggregate: &Aggregate, actor: &str) -> Result<i64> {
        let head_def = self.require_definition(&aggregate.head_type).await?;

        let head_id = match aggregate.head_id() {
            Some(id) => {
                self.persistence
                    .update(&aggregate.head_type, id, &aggregate.head, actor)
                    .await?
                    .ok_or_else(|| {
                        EngineError::EntityNotFound(format!("{}#{}", aggregate.head_type, id))
                    })?;
                id
            }
            None => {
                let saved = self
                    .persistence
                    .create(&aggregate.head_type, &aggregate.head, actor)
                    .await?;
                saved
                    .get("Id")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| {
                        EngineError::ExecutionError(format!(
                            "Head insert for '{}' returned no id",
                            aggregate.head_type
                        ))
                    })?
            }
        };

        let children = self.store.children_of(head_def.id).await;
        for detail in &aggregate.details {
            let Some(child) = children
                .iter()
                .find(|c| c.full_type_name() == detail.entity_type)
            else {
                return Err(EngineError::Validation(format!(
                    "'{}' is not a detail of '{}'",
                    detail.entity_type, aggregate.head_type
                )));
            };
            if !child.auto_cascade_save {
                warn!(
                    detail = %detail.entity_type,
                    "cascade save disabled for detail set; rows skipped"
                );
                continue;
            }
            let fk_field = foreign_key_field(child, &head_def);
            for entry in &detail.rows {
                match entry {
                    DetailEntry::Record(record) => {
                        let mut record = record.clone();
                        record.insert(fk_field.clone(), serde_json::json!(head_id));
                        match record.get("Id").and_then(|v| v.as_i64()).filter(|id| *id > 0) {
                            Some(id) => {
                                self.persistence
                                    .update(&detail.entity_type, id, &record, actor)
                                    .await?
                                    .ok_or_else(|| {
                                        EngineError::EntityNotFound(format!(
                                            "{}#{}",
                                            detail.entity_type, id
                                        ))
                                    })?;
                            }
                            None => {
                                self.persistence
                                    .create(&detail.entity_type, &record, actor)
                                    .await?;
                            }
                        }
                    }
                    DetailEntry::Nested(nested) => {
                        let mut nested = nested.clone();
                        nested
                            .head
                            .insert(fk_field.clone(), serde_json::json!(head_id));
                        self.save(&nested, actor).await?;
                    }
                }
            }
        }

        Ok(head_id)
    }

    /// Load the head and every detail collection, filtered by the parent
    /// foreign key. Details that are themselves aggregate heads come back
    /// as nested aggregates.
    #[async_recursion]
    pub async fn load(&self, head_type: &str, id: i64) -> Result<Option<Aggregate>> {
        let head_def = self.require_definition(head_type).await?;
        let Some(head) = self.persistence.get_by_id(head_type, id).await? else {
            return Ok(None);
        };

        let mut aggregate = Aggregate::new(head_type, head);
        for child in self.store.children_of(head_def.id).await {
            let child_type = child.full_type_name();
            let fk_field = foreign_key_field(&child, &head_def);
            let rows = self
                .persistence
                .query(&child_type, &fk_query(&fk_field, id))
                .await?;

            let nested_children = !self.store.children_of(child.id).await.is_empty();
            let mut entries = Vec::with_capacity(rows.len());
            for row in rows {
                if nested_children {
                    let Some(row_id) = row.get("Id").and_then(|v| v.as_i64()) else {
                        entries.push(DetailEntry::Record(row));
                        continue;
                    };
                    match self.load(&child_type, row_id).await? {
                        Some(nested) => entries.push(DetailEntry::Nested(nested)),
                        None => entries.push(DetailEntry::Record(row)),
                    }
                } else {
                    entries.push(DetailEntry::Record(row));
                }
            }
            aggregate.details.push(DetailRows { entity_type: child_type, rows: entries });
        }
        Ok(Some(aggregate))
    }

    /// Delete the head after applying each child's cascade policy.
    /// `Restrict` refuses when live detail rows exist.
    #[async_recursion]
    pub async fn delete(&self, head_type: &str, id: i64, actor: &str) -> Result<bool> {
        let head_def = self.require_definition(head_type).await?;

        for child in self.store.children_of(head_def.id).await {
            let child_type = child.full_type_name();
            let fk_field = foreign_key_field(&child, &head_def);
            let rows = self
                .persistence
                .query(&child_type, &fk_query(&fk_field, id))
                .await?;

            match child.cascade_delete {
                CascadePolicy::Restrict => {
                    if !rows.is_empty() {
                        return Err(EngineError::ConstraintViolation(format!(
                            "Cannot delete '{}' record {}: detail '{}' has {} live row(s) and its policy is Restrict",
                            head_type,
                            id,
                            child_type,
                            rows.len()
                        )));
                    }
                }
                CascadePolicy::Cascade => {
                    let nested = !self.store.children_of(child.id).await.is_empty();
                    for row in rows {
                        let Some(row_id) = row.get("Id").and_then(|v| v.as_i64()) else {
                            continue;
                        };
                        if nested {
                            self.delete(&child_type, row_id, actor).await?;
                        } else {
                            self.persistence.delete(&child_type, row_id, actor).await?;
                        }
                    }
                }
                CascadePolicy::SetNull => {
                    for row in rows {
                        let Some(row_id) = row.get("Id").and_then(|v| v.as_i64()) else {
                            continue;
                        };
                        let mut patch = JsonMap::new();
                        patch.insert(fk_field.clone(), serde_json::Value::Null);
                        self.persistence
                            .update(&child_type, row_id, &patch, actor)
                            .await?;
                    }
                }
                CascadePolicy::NoAction => {}
            }
        }

        self.persistence.delete(head_type, id, actor).await
    }

    async fn require_definition(&self, full_type_name: &str) -> Result<EntityDefinition> {
        self.store
            .find_by_type_name(full_type_name)
            .await
            .ok_or_else(|| EngineError::EntityNotFound(full_type_name.to_string()))
    }
}

fn foreign_key_field(child: &EntityDefinition, head: &EntityDefinition) -> String {
    child
        .parent_foreign_key_field
        .clone()
        .unwrap_or_else(|| format!("{}Id", head.entity_name))
}

fn fk_query(fk_field: &str, id: i64) -> QueryOptions {
    QueryOptions::new().filter(FilterCondition::new(
        fk_field,
        FilterOperator::Equals,
        serde_json::json!(id),
    ))
}
