use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::compiler::{EntityType, TypeRegistry};
use crate::core::{EngineError, Result, Row, RowSchema, Value};
use crate::persistence::filter::{FilterCondition, QueryOptions};
use crate::storage::SchemaBackend;

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Generic persistence over compiled entity types. Every operation takes
/// a full type name, resolves the compiled type through the registry and
/// works with JSON payloads; no per-entity code exists anywhere.
pub struct PersistenceService {
    registry: Arc<TypeRegistry>,
    backend: Arc<dyn SchemaBackend>,
}

impl PersistenceService {
    pub fn new(registry: Arc<TypeRegistry>, backend: Arc<dyn SchemaBackend>) -> Self {
        Self { registry, backend }
    }

    fn resolve(&self, type_name: &str) -> Result<Arc<EntityType>> {
        self.registry
            .get(type_name)
            .ok_or_else(|| EngineError::TypeNotLoaded(type_name.to_string()))
    }

    pub async fn query(&self, type_name: &str, options: &QueryOptions) -> Result<Vec<JsonMap>> {
        let entity_type = self.resolve(type_name)?;
        let rows = self.backend.scan(&entity_type.table_name).await?;
        let rows = apply_pipeline(&entity_type.schema, rows, options, entity_type.soft_delete)?;
        Ok(rows
            .iter()
            .map(|row| row_to_map(&entity_type.schema, row))
            .collect())
    }

    pub async fn get_by_id(&self, type_name: &str, id: i64) -> Result<Option<JsonMap>> {
        let entity_type = self.resolve(type_name)?;
        let Some(row) = self.backend.get(&entity_type.table_name, id).await? else {
            return Ok(None);
        };
        if entity_type.soft_delete && is_soft_deleted(&entity_type.schema, &row) {
            return Ok(None);
        }
        Ok(Some(row_to_map(&entity_type.schema, &row)))
    }

    /// Insert a new record. Audit members are stamped server-side and any
    /// caller-supplied values for them are discarded.
    pub async fn create(&self, type_name: &str, data: &JsonMap, actor: &str) -> Result<JsonMap> {
        let entity_type = self.resolve(type_name)?;
        let schema = &entity_type.schema;
        let now = Utc::now();

        let mut row: Row = Vec::with_capacity(schema.column_count());
        for column in schema.columns() {
            let value = match data.get(&column.name) {
                Some(json) => Value::from_json(&column.data_type, json)?,
                None => Value::Null,
            };
            row.push(value);
        }

        if entity_type.soft_delete {
            set_cell(schema, &mut row, "IsDeleted", Value::Boolean(false));
            set_cell(schema, &mut row, "DeletedAt", Value::Null);
            set_cell(schema, &mut row, "DeletedBy", Value::Null);
        }
        if entity_type.audited {
            set_cell(schema, &mut row, "CreatedAt", Value::Timestamp(now));
            set_cell(schema, &mut row, "CreatedBy", Value::Text(actor.to_string()));
            set_cell(schema, &mut row, "UpdatedAt", Value::Timestamp(now));
            set_cell(schema, &mut row, "UpdatedBy", Value::Text(actor.to_string()));
        }
        if let Some(idx) = schema.find_column_index("Version")
            && row[idx].is_null()
        {
            row[idx] = Value::Integer(1);
        }

        validate_row(&entity_type, &row)?;
        let id = self.backend.insert(&entity_type.table_name, row).await?;
        let stored = self
            .backend
            .get(&entity_type.table_name, id)
            .await?
            .ok_or_else(|| {
                EngineError::ExecutionError(format!(
                    "Inserted row {} vanished from '{}'",
                    id, entity_type.table_name
                ))
            })?;
        Ok(row_to_map(schema, &stored))
    }

    /// Merge a payload into an existing record. Creation stamps are
    /// immutable; UpdatedAt/UpdatedBy are always overwritten and Version
    /// is incremented.
    pub async fn update(
        &self,
        type_name: &str,
        id: i64,
        data: &JsonMap,
        actor: &str,
    ) -> Result<Option<JsonMap>> {
        let entity_type = self.resolve(type_name)?;
        let schema = &entity_type.schema;
        let Some(mut row) = self.backend.get(&entity_type.table_name, id).await? else {
            return Ok(None);
        };

        let previous_version = schema
            .find_column_index("Version")
            .and_then(|idx| row[idx].as_i64());

        for (idx, column) in schema.columns().iter().enumerate() {
            if column.primary_key {
                continue;
            }
            if entity_type.audited && matches!(column.name.as_str(), "CreatedAt" | "CreatedBy") {
                continue;
            }
            if let Some(json) = data.get(&column.name) {
                row[idx] = Value::from_json(&column.data_type, json)?;
            }
        }

        if entity_type.audited {
            set_cell(schema, &mut row, "UpdatedAt", Value::Timestamp(Utc::now()));
            set_cell(schema, &mut row, "UpdatedBy", Value::Text(actor.to_string()));
        }
        if let Some(idx) = schema.find_column_index("Version") {
            row[idx] = Value::Integer(previous_version.unwrap_or(0) + 1);
        }

        validate_row(&entity_type, &row)?;
        if !self.backend.update(&entity_type.table_name, id, row.clone()).await? {
            return Ok(None);
        }
        Ok(Some(row_to_map(schema, &row)))
    }

    /// Soft delete. Returns false when the type has no soft-delete marker
    /// or the record is missing or already deleted.
    pub async fn delete(&self, type_name: &str, id: i64, actor: &str) -> Result<bool> {
        let entity_type = self.resolve(type_name)?;
        if !entity_type.soft_delete {
            warn!(type_name, "delete skipped: type has no soft-delete marker");
            return Ok(false);
        }
        let schema = &entity_type.schema;
        let Some(mut row) = self.backend.get(&entity_type.table_name, id).await? else {
            return Ok(false);
        };
        if is_soft_deleted(schema, &row) {
            return Ok(false);
        }

        set_cell(schema, &mut row, "IsDeleted", Value::Boolean(true));
        set_cell(schema, &mut row, "DeletedAt", Value::Timestamp(Utc::now()));
        set_cell(schema, &mut row, "DeletedBy", Value::Text(actor.to_string()));
        self.backend.update(&entity_type.table_name, id, row).await
    }

    pub async fn count(&self, type_name: &str, filters: &[FilterCondition]) -> Result<usize> {
        let options = QueryOptions {
            filters: filters.to_vec(),
            ..QueryOptions::default()
        };
        Ok(self.query(type_name, &options).await?.len())
    }

    /// Same filter/order/paging pipeline against a raw table name,
    /// bypassing the registry. Soft-deleted rows are excluded whenever the
    /// table carries the marker column.
    pub async fn query_raw(&self, table: &str, options: &QueryOptions) -> Result<Vec<JsonMap>> {
        let schema = self.backend.table_schema(table).await?;
        let rows = self.backend.scan(table).await?;
        let soft_delete = schema.has_column("IsDeleted");
        let rows = apply_pipeline(&schema, rows, options, soft_delete)?;
        Ok(rows.iter().map(|row| row_to_map(&schema, row)).collect())
    }
}

fn validate_row(entity_type: &EntityType, row: &Row) -> Result<()> {
    for (column, value) in entity_type.schema.columns().iter().zip(row) {
        // Serial pk cells may be NULL before insert assigns them.
        if column.primary_key && value.is_null() {
            continue;
        }
        entity_type.validate_cell(&column.name, value)?;
    }
    Ok(())
}

fn set_cell(schema: &RowSchema, row: &mut Row, name: &str, value: Value) {
    if let Some(idx) = schema.find_column_index(name) {
        row[idx] = value;
    }
}

fn is_soft_deleted(schema: &RowSchema, row: &Row) -> bool {
    schema
        .find_column_index("IsDeleted")
        .is_some_and(|idx| row.get(idx) == Some(&Value::Boolean(true)))
}

fn row_to_map(schema: &RowSchema, row: &Row) -> JsonMap {
    schema
        .columns()
        .iter()
        .zip(row)
        .map(|(column, value)| (column.name.clone(), value.to_json()))
        .collect()
}

/// Soft-delete exclusion, filters, ordering and paging, in that order.
/// Unknown filter or order fields are skipped with a warning; unsupported
/// operator usage is an error.
fn apply_pipeline(
    schema: &RowSchema,
    mut rows: Vec<Row>,
    options: &QueryOptions,
    soft_delete: bool,
) -> Result<Vec<Row>> {
    if soft_delete
        && !options.include_deleted
        && let Some(idx) = schema.find_column_index("IsDeleted")
    {
        rows.retain(|row| row.get(idx) != Some(&Value::Boolean(true)));
    }

    for condition in &options.filters {
        let Some(idx) = schema.find_column_index(&condition.field) else {
            warn!(field = %condition.field, "filter field not found; condition skipped");
            continue;
        };
        let column = &schema.columns()[idx];
        let expected = Value::from_json(&column.data_type, &condition.value)?;
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if condition.operator.matches(&row[idx], &expected)? {
                kept.push(row);
            }
        }
        rows = kept;
    }

    if let Some(order_field) = &options.order_by {
        match schema.find_column_index(order_field) {
            Some(idx) => {
                rows.sort_by(|a, b| {
                    a[idx]
                        .compare(&b[idx])
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                if options.descending {
                    rows.reverse();
                }
            }
            None => warn!(field = %order_field, "order field not found; ordering skipped"),
        }
    }

    let skipped = rows.into_iter().skip(options.skip.unwrap_or(0));
    Ok(match options.take {
        Some(take) => skipped.take(take).collect(),
        None => skipped.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};
    use crate::persistence::filter::FilterOperator;

    fn schema() -> RowSchema {
        RowSchema::new(vec![
            Column::new("Id", DataType::Integer).primary_key(),
            Column::new("Name", DataType::Text),
            Column::new("Price", DataType::Float),
            Column::new("IsDeleted", DataType::Boolean),
        ])
    }

    fn rows() -> Vec<Row> {
        vec![
            vec![Value::Integer(1), Value::Text("Apple".into()), Value::Float(3.0), Value::Boolean(false)],
            vec![Value::Integer(2), Value::Text("Banana".into()), Value::Float(1.0), Value::Boolean(false)],
            vec![Value::Integer(3), Value::Text("Avocado".into()), Value::Float(5.0), Value::Boolean(true)],
        ]
    }

    #[test]
    fn test_soft_delete_exclusion_and_override() {
        let visible = apply_pipeline(&schema(), rows(), &QueryOptions::new(), true).unwrap();
        assert_eq!(visible.len(), 2);

        let all = apply_pipeline(&schema(), rows(), &QueryOptions::new().with_deleted(), true).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_filter_order_page() {
        let options = QueryOptions::new()
            .filter(FilterCondition::new(
                "Name",
                FilterOperator::StartsWith,
                serde_json::json!("A"),
            ))
            .order_by("Price", true)
            .page(0, 1);
        let result = apply_pipeline(&schema(), rows(), &options, false).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0][1], Value::Text("Avocado".into()));
    }

    #[test]
    fn test_unknown_filter_field_is_skipped() {
        let options = QueryOptions::new().filter(FilterCondition::new(
            "NoSuchField",
            FilterOperator::Equals,
            serde_json::json!(1),
        ));
        let result = apply_pipeline(&schema(), rows(), &options, false).unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_unknown_order_field_is_skipped() {
        let options = QueryOptions::new().order_by("Nope", false);
        let result = apply_pipeline(&schema(), rows(), &options, false).unwrap();
        assert_eq!(result[0][0], Value::Integer(1));
    }
}
