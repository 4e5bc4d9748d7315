use std::collections::{HashMap, HashSet};

use crate::metadata::{
    DdlKind, EntityDefinition, FieldDataType, FieldMetadata, InterfaceKind,
};
use crate::storage::ColumnInfo;

/// Difference between an entity's metadata and its live table columns.
#[derive(Debug, Clone, Default)]
pub struct ChangeAnalysis {
    pub new_fields: Vec<FieldMetadata>,
    /// (property name, new length) for widened text columns.
    pub length_increases: Vec<(String, u32)>,
    pub length_decreases: Vec<String>,
    pub removed_columns: Vec<String>,
}

impl ChangeAnalysis {
    pub fn has_changes(&self) -> bool {
        !self.new_fields.is_empty() || !self.length_increases.is_empty()
    }

    /// Shrinking or dropping columns loses data; locked entities reject these.
    pub fn has_destructive_changes(&self) -> bool {
        !self.length_decreases.is_empty() || !self.removed_columns.is_empty()
    }

    /// Compare metadata fields against live columns.
    pub fn diff(entity: &EntityDefinition, live: &[ColumnInfo]) -> Self {
        let live_by_name: HashMap<&str, &ColumnInfo> =
            live.iter().map(|c| (c.name.as_str(), c)).collect();
        let field_names: HashSet<&str> =
            entity.fields.iter().map(|f| f.property_name.as_str()).collect();

        let mut analysis = ChangeAnalysis::default();
        for field in entity.ordered_fields() {
            match live_by_name.get(field.property_name.as_str()) {
                None => analysis.new_fields.push(field.clone()),
                Some(column) => {
                    if field.data_type == FieldDataType::String
                        && let (Some(new_len), Some(old_len)) = (field.length, column.max_length)
                    {
                        if new_len > old_len {
                            analysis
                                .length_increases
                                .push((field.property_name.clone(), new_len));
                        } else if new_len < old_len {
                            analysis.length_decreases.push(field.property_name.clone());
                        }
                    }
                }
            }
        }
        for column in live {
            if !field_names.contains(column.name.as_str()) {
                analysis.removed_columns.push(column.name.clone());
            }
        }
        analysis
    }
}

/// SQL dialect seam. The engine generates text through this trait so a
/// different dialect only needs a new implementation.
pub trait DdlGenerator: Send + Sync {
    /// Full creation script: table, foreign keys, indexes, comment.
    /// `lookup_tables` maps referenced entity names to their table names.
    fn create_table_script(
        &self,
        entity: &EntityDefinition,
        lookup_tables: &HashMap<String, String>,
    ) -> String;

    /// Script applying a change analysis: ADD COLUMN for new fields,
    /// ALTER COLUMN TYPE for widened text columns, plus FK/index statements
    /// for newly added lookups.
    fn alter_table_script(
        &self,
        entity: &EntityDefinition,
        analysis: &ChangeAnalysis,
        lookup_tables: &HashMap<String, String>,
    ) -> String;

    fn drop_table_script(&self, entity: &EntityDefinition) -> String;

    /// Inverse script for a previously executed kind.
    fn rollback_script(&self, kind: DdlKind, entity: &EntityDefinition) -> Option<String>;
}

/// PostgreSQL-shaped generator, the default dialect.
pub struct PostgresDdlGenerator;

impl PostgresDdlGenerator {
    fn column_sql(field: &FieldMetadata) -> String {
        // Any integer field named Id is the serial primary key.
        if field.property_name == "Id"
            && matches!(field.data_type, FieldDataType::Integer | FieldDataType::Long)
        {
            return "\"Id\" SERIAL PRIMARY KEY".to_string();
        }

        let mut sql = format!("\"{}\" {}", field.property_name, Self::sql_type(field));
        if field.required {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = Self::default_clause(field) {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        sql
    }

    fn sql_type(field: &FieldMetadata) -> String {
        match field.data_type {
            FieldDataType::String => match field.length {
                Some(len) => format!("VARCHAR({})", len),
                None => "TEXT".to_string(),
            },
            FieldDataType::Integer => "INTEGER".to_string(),
            FieldDataType::Long => "BIGINT".to_string(),
            FieldDataType::Decimal => format!(
                "NUMERIC({},{})",
                field.precision.unwrap_or(18),
                field.scale.unwrap_or(2)
            ),
            FieldDataType::Boolean => "BOOLEAN".to_string(),
            FieldDataType::DateTime => "TIMESTAMP".to_string(),
            FieldDataType::Guid => "UUID".to_string(),
            FieldDataType::Enum => "VARCHAR(100)".to_string(),
        }
    }

    fn default_clause(field: &FieldMetadata) -> Option<String> {
        let raw = field.default_value.as_deref()?;
        Some(match raw {
            "NOW" => "CURRENT_TIMESTAMP".to_string(),
            "NEWID" => "gen_random_uuid()".to_string(),
            literal => match field.data_type {
                FieldDataType::Integer
                | FieldDataType::Long
                | FieldDataType::Decimal
                | FieldDataType::Boolean => literal.to_string(),
                _ => format!("'{}'", literal.replace('\'', "''")),
            },
        })
    }

    fn constraint_statements(
        entity: &EntityDefinition,
        fields: &[&FieldMetadata],
        lookup_tables: &HashMap<String, String>,
    ) -> Vec<String> {
        let table = entity.table_name();
        let mut statements = Vec::new();
        for field in fields {
            let Some(target) = &field.lookup_entity_name else {
                continue;
            };
            let Some(target_table) = lookup_tables.get(target) else {
                continue;
            };
            statements.push(format!(
                "ALTER TABLE \"{table}\" ADD CONSTRAINT \"FK_{table}_{col}\" FOREIGN KEY (\"{col}\") REFERENCES \"{target_table}\" (\"Id\") ON DELETE {action};",
                table = table,
                col = field.property_name,
                target_table = target_table,
                action = field.foreign_key_action.sql_clause(),
            ));
            statements.push(format!(
                "CREATE INDEX \"IX_{table}_{col}\" ON \"{table}\" (\"{col}\");",
                table = table,
                col = field.property_name,
            ));
        }
        statements
    }
}

impl DdlGenerator for PostgresDdlGenerator {
    fn create_table_script(
        &self,
        entity: &EntityDefinition,
        lookup_tables: &HashMap<String, String>,
    ) -> String {
        let table = entity.table_name();
        let fields = entity.ordered_fields();

        let mut column_defs = Vec::with_capacity(fields.len());
        let mut added = HashSet::new();
        for field in &fields {
            if added.insert(field.property_name.clone()) {
                column_defs.push(format!("    {}", Self::column_sql(field)));
            }
        }

        let mut statements = vec![format!(
            "CREATE TABLE \"{}\" (\n{}\n);",
            table,
            column_defs.join(",\n")
        )];

        statements.extend(Self::constraint_statements(entity, &fields, lookup_tables));

        if entity.has_interface(InterfaceKind::Archive) {
            statements.push(format!(
                "CREATE UNIQUE INDEX \"UX_{table}_Code\" ON \"{table}\" (\"Code\");",
                table = table
            ));
        }

        statements.push(format!(
            "COMMENT ON TABLE \"{}\" IS '{}';",
            table,
            entity.display_label("en").replace('\'', "''")
        ));

        statements.join("\n")
    }

    fn alter_table_script(
        &self,
        entity: &EntityDefinition,
        analysis: &ChangeAnalysis,
        lookup_tables: &HashMap<String, String>,
    ) -> String {
        let table = entity.table_name();
        let mut statements = Vec::new();

        for field in &analysis.new_fields {
            statements.push(format!(
                "ALTER TABLE \"{}\" ADD COLUMN {};",
                table,
                Self::column_sql(field)
            ));
        }
        for (name, new_len) in &analysis.length_increases {
            statements.push(format!(
                "ALTER TABLE \"{}\" ALTER COLUMN \"{}\" TYPE VARCHAR({});",
                table, name, new_len
            ));
        }

        let new_refs: Vec<&FieldMetadata> = analysis.new_fields.iter().collect();
        statements.extend(Self::constraint_statements(entity, &new_refs, lookup_tables));

        statements.join("\n")
    }

    fn drop_table_script(&self, entity: &EntityDefinition) -> String {
        format!("DROP TABLE IF EXISTS \"{}\";", entity.table_name())
    }

    fn rollback_script(&self, kind: DdlKind, entity: &EntityDefinition) -> Option<String> {
        match kind {
            DdlKind::Create => Some(self.drop_table_script(entity)),
            // Alter/Drop rollbacks need the prior column state, which the
            // history record does not carry.
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FieldSource, ForeignKeyAction};

    fn entity_with_base() -> EntityDefinition {
        let mut def = EntityDefinition::new("Custom", "Product", "admin");
        def.enable_interface(InterfaceKind::Base);
        def.apply_interface_fields();
        def.upsert_field(
            FieldMetadata::new("Name", FieldDataType::String)
                .with_length(200)
                .required()
                .with_sort_order(1),
        )
        .unwrap();
        def.upsert_field(
            FieldMetadata::new("CategoryId", FieldDataType::Integer)
                .lookup("Category", ForeignKeyAction::SetNull)
                .with_sort_order(2),
        )
        .unwrap();
        def
    }

    #[test]
    fn test_create_script_shape() {
        let def = entity_with_base();
        let mut lookups = HashMap::new();
        lookups.insert("Category".to_string(), "categories".to_string());

        let sql = PostgresDdlGenerator.create_table_script(&def, &lookups);
        assert!(sql.contains("CREATE TABLE \"products\""));
        assert!(sql.contains("\"Id\" SERIAL PRIMARY KEY"));
        assert!(sql.contains("\"Name\" VARCHAR(200) NOT NULL"));
        assert!(sql.contains("\"IsDeleted\" BOOLEAN NOT NULL DEFAULT false"));
        assert!(sql.contains(
            "FOREIGN KEY (\"CategoryId\") REFERENCES \"categories\" (\"Id\") ON DELETE SET NULL"
        ));
        assert!(sql.contains("CREATE INDEX \"IX_products_CategoryId\""));
    }

    #[test]
    fn test_default_markers() {
        let now_field = FieldMetadata::new("CreatedAt", FieldDataType::DateTime).with_default("NOW");
        assert!(PostgresDdlGenerator::column_sql(&now_field).contains("DEFAULT CURRENT_TIMESTAMP"));

        let guid_field = FieldMetadata::new("Token", FieldDataType::Guid).with_default("NEWID");
        assert!(PostgresDdlGenerator::column_sql(&guid_field).contains("DEFAULT gen_random_uuid()"));

        let text_field =
            FieldMetadata::new("State", FieldDataType::String).with_default("it's new");
        assert!(PostgresDdlGenerator::column_sql(&text_field).contains("DEFAULT 'it''s new'"));
    }

    #[test]
    fn test_change_analysis_diff() {
        let mut def = EntityDefinition::new("Custom", "Product", "admin");
        def.upsert_field(
            FieldMetadata::new("Name", FieldDataType::String)
                .with_length(500)
                .with_source(FieldSource::Custom),
        )
        .unwrap();
        def.upsert_field(FieldMetadata::new("Price", FieldDataType::Decimal))
            .unwrap();

        let live = vec![ColumnInfo {
            name: "Name".to_string(),
            data_type: crate::core::DataType::Text,
            max_length: Some(200),
            nullable: true,
        }];

        let analysis = ChangeAnalysis::diff(&def, &live);
        assert_eq!(analysis.new_fields.len(), 1);
        assert_eq!(analysis.new_fields[0].property_name, "Price");
        assert_eq!(analysis.length_increases, vec![("Name".to_string(), 500)]);
        assert!(!analysis.has_destructive_changes());
    }

    #[test]
    fn test_length_decrease_is_destructive() {
        let mut def = EntityDefinition::new("Custom", "Product", "admin");
        def.upsert_field(
            FieldMetadata::new("Name", FieldDataType::String).with_length(50),
        )
        .unwrap();
        let live = vec![ColumnInfo {
            name: "Name".to_string(),
            data_type: crate::core::DataType::Text,
            max_length: Some(200),
            nullable: true,
        }];
        let analysis = ChangeAnalysis::diff(&def, &live);
        assert!(analysis.has_destructive_changes());
    }

    #[test]
    fn test_rollback_of_create_is_drop() {
        let def = entity_with_base();
        let sql = PostgresDdlGenerator
            .rollback_script(DdlKind::Create, &def)
            .unwrap();
        assert_eq!(sql, "DROP TABLE IF EXISTS \"products\";");
    }
}
