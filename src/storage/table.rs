use std::collections::BTreeMap;

use crate::core::{Column, EngineError, Result, Row, RowSchema, Value};

/// One physical table: a schema plus rows keyed by their integer id.
/// Serial ids are assigned on insert when the primary key cell is NULL.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    schema: RowSchema,
    rows: BTreeMap<i64, Row>,
    next_id: i64,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: RowSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &RowSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert a row, assigning a serial id when the pk cell is NULL.
    /// Returns the row id.
    pub fn insert(&mut self, mut row: Row) -> Result<i64> {
        let id = match self.schema.primary_key_index() {
            Some(pk_idx) => {
                let id = match row.get(pk_idx) {
                    Some(Value::Integer(explicit)) if *explicit > 0 => *explicit,
                    _ => {
                        let assigned = self.next_id;
                        if pk_idx < row.len() {
                            row[pk_idx] = Value::Integer(assigned);
                        }
                        assigned
                    }
                };
                if self.rows.contains_key(&id) {
                    return Err(EngineError::ConstraintViolation(format!(
                        "Duplicate primary key {} in table '{}'",
                        id, self.name
                    )));
                }
                id
            }
            None => self.next_id,
        };

        self.schema.validate_row(&row)?;
        self.rows.insert(id, row);
        if id >= self.next_id {
            self.next_id = id + 1;
        }
        Ok(id)
    }

    pub fn update(&mut self, id: i64, row: Row) -> Result<bool> {
        if !self.rows.contains_key(&id) {
            return Ok(false);
        }
        self.schema.validate_row(&row)?;
        self.rows.insert(id, row);
        Ok(true)
    }

    pub fn get(&self, id: i64) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn scan(&self) -> Vec<Row> {
        self.rows.values().cloned().collect()
    }

    /// Append a column; existing rows are padded with NULL.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if self.schema.has_column(&column.name) {
            return Err(EngineError::ExecutionError(format!(
                "Column '{}' already exists in table '{}'",
                column.name, self.name
            )));
        }
        if !column.nullable && !self.rows.is_empty() {
            return Err(EngineError::ConstraintViolation(format!(
                "Cannot add NOT NULL column '{}' to non-empty table '{}'",
                column.name, self.name
            )));
        }
        let mut columns = self.schema.columns().to_vec();
        columns.push(column);
        self.schema = RowSchema::new(columns);
        for row in self.rows.values_mut() {
            row.push(Value::Null);
        }
        Ok(())
    }

    /// Replace a column's type and length limit. Used for widening alters;
    /// stored values are left as they are.
    pub fn alter_column(&mut self, name: &str, data_type: crate::core::DataType, max_length: Option<u32>) -> Result<()> {
        let Some(idx) = self.schema.find_column_index(name) else {
            return Err(EngineError::ColumnNotFound(name.to_string(), self.name.clone()));
        };
        let mut columns = self.schema.columns().to_vec();
        columns[idx].data_type = data_type;
        columns[idx].max_length = max_length;
        self.schema = RowSchema::new(columns);
        Ok(())
    }
}
