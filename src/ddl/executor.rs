use std::sync::Arc;

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::{EngineError, Result};
use crate::metadata::{DdlKind, DdlScript, MetadataStore};
use crate::storage::{ColumnInfo, SchemaBackend};

/// Runs generated DDL against the schema backend and keeps the execution
/// history. SQL failure is data, not an error: `execute` always returns a
/// record and the record carries the outcome.
pub struct DdlExecutor {
    backend: Arc<dyn SchemaBackend>,
    store: MetadataStore,
}

impl DdlExecutor {
    pub fn new(backend: Arc<dyn SchemaBackend>, store: MetadataStore) -> Self {
        Self { backend, store }
    }

    pub fn backend(&self) -> &Arc<dyn SchemaBackend> {
        &self.backend
    }

    pub async fn execute(
        &self,
        entity_id: Uuid,
        kind: DdlKind,
        sql: impl Into<String>,
        actor: &str,
    ) -> DdlScript {
        let mut record = DdlScript::pending(entity_id, kind, sql, actor);
        match self.backend.execute_ddl(&record.sql).await {
            Ok(()) => {
                record.mark_success();
                info!(entity = %entity_id, ?kind, "ddl executed");
            }
            Err(e) => {
                record.mark_failed(e.to_string());
                error!(entity = %entity_id, ?kind, error = %e, "ddl failed");
            }
        }
        self.store.record_script(record.clone()).await;
        record
    }

    /// Execute several scripts as one unit. On any failure the backend is
    /// left untouched and no history rows are persisted; the returned
    /// records still describe what happened.
    pub async fn execute_batch(
        &self,
        entity_id: Uuid,
        scripts: Vec<(DdlKind, String)>,
        actor: &str,
    ) -> Vec<DdlScript> {
        let mut records: Vec<DdlScript> = scripts
            .iter()
            .map(|(kind, sql)| DdlScript::pending(entity_id, *kind, sql.clone(), actor))
            .collect();
        let statements: Vec<String> = scripts.into_iter().map(|(_, sql)| sql).collect();

        match self.backend.execute_ddl_batch(&statements).await {
            Ok(()) => {
                for record in &mut records {
                    record.mark_success();
                }
                self.store.record_scripts(records.clone()).await;
                info!(entity = %entity_id, count = records.len(), "ddl batch executed");
            }
            Err(batch_error) => {
                records[batch_error.index].mark_failed(batch_error.error.to_string());
                warn!(
                    entity = %entity_id,
                    failed_index = batch_error.index,
                    error = %batch_error.error,
                    "ddl batch rolled back"
                );
            }
        }
        records
    }

    /// Run a compensating script for an earlier execution. The original id
    /// must exist; on success its status flips to RolledBack.
    pub async fn rollback(
        &self,
        original_script_id: Uuid,
        rollback_sql: impl Into<String>,
        actor: &str,
    ) -> Result<DdlScript> {
        let original = self
            .store
            .script(original_script_id)
            .await
            .ok_or(EngineError::ScriptNotFound(original_script_id))?;

        let record = self
            .execute(original.entity_definition_id, DdlKind::Rollback, rollback_sql, actor)
            .await;
        if record.status == crate::metadata::DdlStatus::Success {
            self.store.mark_rolled_back(original_script_id).await?;
        }
        Ok(record)
    }

    /// Parse-only dry run.
    pub fn validate(&self, sql: &str) -> Result<()> {
        Parser::parse_sql(&PostgreSqlDialect {}, sql)
            .map(|_| ())
            .map_err(|e| EngineError::ParseError(e.to_string()))
    }

    pub async fn table_exists(&self, table: &str) -> bool {
        self.backend.table_exists(table).await
    }

    pub async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.backend.table_columns(table).await
    }

    pub async fn history(&self, entity_id: Uuid) -> Vec<DdlScript> {
        self.store.history(entity_id).await
    }
}
