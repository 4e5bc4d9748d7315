use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DdlKind {
    Create,
    Alter,
    Drop,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DdlStatus {
    Pending,
    Success,
    Failed,
    RolledBack,
}

/// History record for one executed DDL script. Execution never throws on
/// SQL failure; the outcome lives in `status` / `error_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdlScript {
    pub id: Uuid,
    pub entity_definition_id: Uuid,
    pub kind: DdlKind,
    pub sql: String,
    pub status: DdlStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_by: String,
}

impl DdlScript {
    pub fn pending(entity_definition_id: Uuid, kind: DdlKind, sql: impl Into<String>, actor: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_definition_id,
            kind,
            sql: sql.into(),
            status: DdlStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
            executed_at: None,
            created_by: actor.to_string(),
        }
    }

    pub fn mark_success(&mut self) {
        self.status = DdlStatus::Success;
        self.executed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = DdlStatus::Failed;
        self.error_message = Some(message.into());
        self.executed_at = Some(Utc::now());
    }
}
