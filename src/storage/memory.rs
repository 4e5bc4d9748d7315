//! In-memory schema backend. Generated DDL text is parsed with `sqlparser`
//! (PostgreSQL dialect) and interpreted against a table map. Constraint,
//! index and comment statements are accepted without a row-store effect.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlparser::ast::{
    self, AlterColumnOperation, AlterTableOperation, ColumnOption, ObjectType, Statement,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::{Column, DataType, EngineError, Result, Row, RowSchema};
use crate::storage::backend::{BatchError, ColumnInfo, SchemaBackend};
use crate::storage::table::Table;

#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(sql: &str) -> Result<Vec<Statement>> {
        Parser::parse_sql(&PostgreSqlDialect {}, sql)
            .map_err(|e| EngineError::ParseError(e.to_string()))
    }

    fn apply_statement(tables: &mut HashMap<String, Table>, statement: &Statement) -> Result<()> {
        match statement {
            Statement::CreateTable(create) => {
                let table_name = object_table_name(&create.name);
                if tables.contains_key(&table_name) {
                    if create.if_not_exists {
                        return Ok(());
                    }
                    return Err(EngineError::TableExists(table_name));
                }
                let mut columns = Vec::with_capacity(create.columns.len());
                for def in &create.columns {
                    columns.push(column_from_def(def)?);
                }
                tables.insert(table_name.clone(), Table::new(table_name, RowSchema::new(columns)));
                Ok(())
            }

            Statement::AlterTable { name, operations, .. } => {
                let table_name = object_table_name(name);
                let table = tables
                    .get_mut(&table_name)
                    .ok_or_else(|| EngineError::TableNotFound(table_name.clone()))?;
                for operation in operations {
                    match operation {
                        AlterTableOperation::AddColumn { column_def, .. } => {
                            table.add_column(column_from_def(column_def)?)?;
                        }
                        AlterTableOperation::AlterColumn { column_name, op } => {
                            if let AlterColumnOperation::SetDataType { data_type, .. } = op {
                                let (mapped, max_length) = map_data_type(data_type)?;
                                table.alter_column(&column_name.value, mapped, max_length)?;
                            }
                        }
                        // Constraints, renames and index-ish operations carry
                        // no row-store state here.
                        _ => {}
                    }
                }
                Ok(())
            }

            Statement::Drop {
                object_type: ObjectType::Table,
                if_exists,
                names,
                ..
            } => {
                for name in names {
                    let table_name = object_table_name(name);
                    if tables.remove(&table_name).is_none() && !if_exists {
                        return Err(EngineError::TableNotFound(table_name));
                    }
                }
                Ok(())
            }

            // CREATE INDEX, COMMENT ON and friends: accepted, no effect.
            _ => Ok(()),
        }
    }

    fn apply_sql(tables: &mut HashMap<String, Table>, sql: &str) -> Result<()> {
        for statement in Self::parse(sql)? {
            Self::apply_statement(tables, &statement)?;
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaBackend for MemoryBackend {
    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        let mut guard = self.tables.write().await;
        // Work on a copy so a failing multi-statement script has no effect.
        let mut working = guard.clone();
        Self::apply_sql(&mut working, sql)?;
        *guard = working;
        debug!(sql, "ddl applied");
        Ok(())
    }

    async fn execute_ddl_batch(&self, statements: &[String]) -> std::result::Result<(), BatchError> {
        let mut guard = self.tables.write().await;
        let mut working = guard.clone();
        for (index, sql) in statements.iter().enumerate() {
            if let Err(error) = Self::apply_sql(&mut working, sql) {
                return Err(BatchError { index, error });
            }
        }
        *guard = working;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> bool {
        self.tables.read().await.contains_key(table)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let guard = self.tables.read().await;
        let table = guard
            .get(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;
        Ok(table
            .schema()
            .columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name.clone(),
                data_type: col.data_type,
                max_length: col.max_length,
                nullable: col.nullable,
            })
            .collect())
    }

    async fn table_schema(&self, table: &str) -> Result<RowSchema> {
        let guard = self.tables.read().await;
        guard
            .get(table)
            .map(|t| t.schema().clone())
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))
    }

    async fn insert(&self, table: &str, row: Row) -> Result<i64> {
        let mut guard = self.tables.write().await;
        let table = guard
            .get_mut(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;
        table.insert(row)
    }

    async fn update(&self, table: &str, id: i64, row: Row) -> Result<bool> {
        let mut guard = self.tables.write().await;
        let table = guard
            .get_mut(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;
        table.update(id, row)
    }

    async fn get(&self, table: &str, id: i64) -> Result<Option<Row>> {
        let guard = self.tables.read().await;
        let table = guard
            .get(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;
        Ok(table.get(id).cloned())
    }

    async fn scan(&self, table: &str) -> Result<Vec<Row>> {
        let guard = self.tables.read().await;
        let table = guard
            .get(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;
        Ok(table.scan())
    }
}

fn column_from_def(def: &ast::ColumnDef) -> Result<Column> {
    let (data_type, max_length) = map_data_type(&def.data_type)?;
    let mut column = Column::new(def.name.value.clone(), data_type);
    if let Some(len) = max_length {
        column = column.with_max_length(len);
    }
    for option in &def.options {
        match &option.option {
            ColumnOption::NotNull => column = column.not_null(),
            ColumnOption::Unique { is_primary, .. } if *is_primary => {
                column = column.primary_key();
            }
            // Defaults and foreign keys are honored at the service layer.
            _ => {}
        }
    }
    Ok(column)
}

fn map_data_type(data_type: &ast::DataType) -> Result<(DataType, Option<u32>)> {
    match data_type {
        ast::DataType::Int(_) | ast::DataType::Integer(_) | ast::DataType::BigInt(_) => {
            Ok((DataType::Integer, None))
        }
        ast::DataType::Varchar(len) | ast::DataType::CharacterVarying(len) => {
            Ok((DataType::Text, character_length(len)))
        }
        ast::DataType::Text => Ok((DataType::Text, None)),
        ast::DataType::Numeric(_) | ast::DataType::Decimal(_) => Ok((DataType::Float, None)),
        ast::DataType::Boolean => Ok((DataType::Boolean, None)),
        ast::DataType::Timestamp(_, _) => Ok((DataType::Timestamp, None)),
        ast::DataType::Uuid => Ok((DataType::Uuid, None)),
        ast::DataType::Custom(name, _) if name.to_string().eq_ignore_ascii_case("serial") => {
            Ok((DataType::Integer, None))
        }
        other => Err(EngineError::UnsupportedOperation(format!(
            "Unsupported column type '{}'",
            other
        ))),
    }
}

fn character_length(len: &Option<ast::CharacterLength>) -> Option<u32> {
    match len {
        Some(ast::CharacterLength::IntegerLength { length, .. }) => Some(*length as u32),
        _ => None,
    }
}

/// Unquoted, schema-stripped table name of an object reference.
fn object_table_name(name: &ast::ObjectName) -> String {
    let raw = name.to_string();
    raw.rsplit('.')
        .next()
        .unwrap_or(raw.as_str())
        .trim_matches('"')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    #[tokio::test]
    async fn test_create_and_insert() {
        let backend = MemoryBackend::new();
        backend
            .execute_ddl("CREATE TABLE \"products\" (\"Id\" SERIAL PRIMARY KEY, \"Name\" VARCHAR(200) NOT NULL)")
            .await
            .unwrap();
        assert!(backend.table_exists("products").await);

        let id = backend
            .insert("products", vec![Value::Null, Value::Text("Widget".into())])
            .await
            .unwrap();
        assert_eq!(id, 1);

        let row = backend.get("products", 1).await.unwrap().unwrap();
        assert_eq!(row[1], Value::Text("Widget".into()));
    }

    #[tokio::test]
    async fn test_alter_add_column() {
        let backend = MemoryBackend::new();
        backend
            .execute_ddl("CREATE TABLE \"products\" (\"Id\" SERIAL PRIMARY KEY)")
            .await
            .unwrap();
        backend
            .execute_ddl("ALTER TABLE \"products\" ADD COLUMN \"Price\" NUMERIC(18,2)")
            .await
            .unwrap();
        let columns = backend.table_columns("products").await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].name, "Price");
        assert_eq!(columns[1].data_type, DataType::Float);
    }

    #[tokio::test]
    async fn test_alter_column_type_widens_length() {
        let backend = MemoryBackend::new();
        backend
            .execute_ddl("CREATE TABLE \"t\" (\"Name\" VARCHAR(10))")
            .await
            .unwrap();
        backend
            .execute_ddl("ALTER TABLE \"t\" ALTER COLUMN \"Name\" TYPE VARCHAR(500)")
            .await
            .unwrap();
        let columns = backend.table_columns("t").await.unwrap();
        assert_eq!(columns[0].max_length, Some(500));
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let backend = MemoryBackend::new();
        let statements = vec![
            "CREATE TABLE \"a\" (\"Id\" SERIAL PRIMARY KEY)".to_string(),
            "CREATE TABLE \"a\" (\"Id\" SERIAL PRIMARY KEY)".to_string(),
        ];
        let err = backend.execute_ddl_batch(&statements).await.unwrap_err();
        assert_eq!(err.index, 1);
        assert!(!backend.table_exists("a").await);
    }

    #[tokio::test]
    async fn test_drop_table() {
        let backend = MemoryBackend::new();
        backend
            .execute_ddl("CREATE TABLE \"gone\" (\"Id\" SERIAL PRIMARY KEY)")
            .await
            .unwrap();
        backend.execute_ddl("DROP TABLE \"gone\"").await.unwrap();
        assert!(!backend.table_exists("gone").await);
        assert!(backend.execute_ddl("DROP TABLE \"gone\"").await.is_err());
        backend
            .execute_ddl("DROP TABLE IF EXISTS \"gone\"")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_foreign_key_clause_is_accepted() {
        let backend = MemoryBackend::new();
        backend
            .execute_ddl("CREATE TABLE \"categories\" (\"Id\" SERIAL PRIMARY KEY)")
            .await
            .unwrap();
        backend
            .execute_ddl(
                "CREATE TABLE \"products\" (\"Id\" SERIAL PRIMARY KEY, \"CategoryId\" INTEGER);\n\
                 ALTER TABLE \"products\" ADD CONSTRAINT \"FK_products_CategoryId\" FOREIGN KEY (\"CategoryId\") REFERENCES \"categories\" (\"Id\") ON DELETE RESTRICT;",
            )
            .await
            .unwrap();
        assert!(backend.table_exists("products").await);
    }
}
