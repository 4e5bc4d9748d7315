use super::{DataType, EngineError, Result, Value};

pub type Row = Vec<Value>;

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Character limit for text columns (VARCHAR(n)); None means unbounded.
    pub max_length: Option<u32>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary_key: false,
            max_length: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn with_max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if matches!(value, Value::Null) {
            if !self.nullable {
                return Err(EngineError::ConstraintViolation(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(EngineError::TypeMismatch(format!(
                "Column '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        if let (Some(limit), Value::Text(s)) = (self.max_length, value)
            && s.chars().count() > limit as usize
        {
            return Err(EngineError::ConstraintViolation(format!(
                "Column '{}' exceeds maximum length {}",
                self.name, limit
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RowSchema {
    columns: Vec<Column>,
}

impl RowSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.find_column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn primary_key_index(&self) -> Option<usize> {
        self.columns.iter().position(|col| col.primary_key)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column_index(name).is_some()
    }

    pub fn validate_row(&self, row: &[Value]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EngineError::TypeMismatch(format!(
                "Row has {} values, schema expects {}",
                row.len(),
                self.columns.len()
            )));
        }
        for (col, value) in self.columns.iter().zip(row) {
            col.validate(value)?;
        }
        Ok(())
    }
}
