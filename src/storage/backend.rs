use async_trait::async_trait;

use crate::core::{DataType, EngineError, Result, Row, RowSchema};

/// Live column description, as reported back to change analysis.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
    pub max_length: Option<u32>,
    pub nullable: bool,
}

/// Failure of one statement inside an atomic batch.
#[derive(Debug)]
pub struct BatchError {
    pub index: usize,
    pub error: EngineError,
}

/// Physical schema-and-rows backend the DDL executor and the persistence
/// service run against. The in-memory implementation interprets generated
/// SQL; a real database backend would hand the text to its driver.
#[async_trait]
pub trait SchemaBackend: Send + Sync {
    async fn execute_ddl(&self, sql: &str) -> Result<()>;

    /// Apply all statements or none of them.
    async fn execute_ddl_batch(&self, statements: &[String]) -> std::result::Result<(), BatchError>;

    async fn table_exists(&self, table: &str) -> bool;

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    async fn table_schema(&self, table: &str) -> Result<RowSchema>;

    /// Insert a row; returns the assigned id.
    async fn insert(&self, table: &str, row: Row) -> Result<i64>;

    /// Replace a row by id; false when the id does not exist.
    async fn update(&self, table: &str, id: i64, row: Row) -> Result<bool>;

    async fn get(&self, table: &str, id: i64) -> Result<Option<Row>>;

    async fn scan(&self, table: &str) -> Result<Vec<Row>>;
}
