//! Deterministic source generation: metadata in, entity DSL text out.
//! Equal metadata must always yield byte-identical text, so field order,
//! spacing and modifier order are fixed.

use std::collections::HashMap;

use uuid::Uuid;

use crate::metadata::{
    CascadePolicy, EntityDefinition, FieldDataType, FieldMetadata, ForeignKeyAction, StructureKind,
};

pub struct SourceGenerator;

impl SourceGenerator {
    /// Render one entity declaration.
    ///
    /// ```text
    /// entity Custom.Product table=products {
    ///   Id: integer pk
    ///   Name: string(200) required
    ///   Price: decimal(18,2)
    ///   CategoryId: lookup(Category) on_delete=restrict
    ///   Status: enum(ProductStatus)
    /// }
    /// ```
    pub fn entity_source(def: &EntityDefinition, enum_names: &HashMap<Uuid, String>) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "entity {} table={} {{\n",
            def.full_type_name(),
            def.table_name()
        ));
        for field in def.ordered_fields() {
            out.push_str("  ");
            out.push_str(&render_field(field, enum_names));
            out.push('\n');
        }
        out.push_str("}\n");
        out
    }

    /// Render an aggregate wrapper for a master/detail structure.
    pub fn aggregate_source(head: &EntityDefinition, children: &[EntityDefinition]) -> String {
        let mut out = String::new();
        out.push_str(&format!("aggregate {}Agg {{\n", head.full_type_name()));
        out.push_str(&format!("  head: {}\n", head.full_type_name()));
        for child in children {
            let key = child
                .parent_foreign_key_field
                .clone()
                .unwrap_or_else(|| format!("{}Id", head.entity_name));
            out.push_str(&format!(
                "  detail {}: {} key {} on_delete={}\n",
                child.entity_name,
                child.full_type_name(),
                key,
                cascade_token(child.cascade_delete)
            ));
        }
        out.push_str("}\n");
        out
    }

    /// Full compilation unit for an entity: the entity itself, its detail
    /// entities, and the aggregate wrapper when the structure is nested.
    pub fn unit_source(
        head: &EntityDefinition,
        children: &[EntityDefinition],
        enum_names: &HashMap<Uuid, String>,
    ) -> String {
        let mut out = Self::entity_source(head, enum_names);
        if head.structure_kind == StructureKind::Single {
            return out;
        }
        for child in children {
            out.push('\n');
            out.push_str(&Self::entity_source(child, enum_names));
        }
        out.push('\n');
        out.push_str(&Self::aggregate_source(head, children));
        out
    }
}

fn render_field(field: &FieldMetadata, enum_names: &HashMap<Uuid, String>) -> String {
    let mut line = format!("{}: {}", field.property_name, type_token(field, enum_names));

    if field.lookup_entity_name.is_some() {
        line.push_str(&format!(" on_delete={}", fk_token(field.foreign_key_action)));
    }
    if field.property_name == "Id" && matches!(field.data_type, FieldDataType::Integer | FieldDataType::Long)
    {
        line.push_str(" pk");
    } else if field.required {
        line.push_str(" required");
    }
    if field.unique {
        line.push_str(" unique");
    }
    line
}

fn type_token(field: &FieldMetadata, enum_names: &HashMap<Uuid, String>) -> String {
    if let Some(target) = &field.lookup_entity_name {
        return format!("lookup({})", target);
    }
    match field.data_type {
        FieldDataType::String => match field.length {
            Some(len) => format!("string({})", len),
            None => "string".to_string(),
        },
        FieldDataType::Integer => "integer".to_string(),
        FieldDataType::Long => "long".to_string(),
        FieldDataType::Decimal => {
            let precision = field.precision.unwrap_or(18);
            let scale = field.scale.unwrap_or(2);
            format!("decimal({},{})", precision, scale)
        }
        FieldDataType::Boolean => "boolean".to_string(),
        FieldDataType::DateTime => "datetime".to_string(),
        FieldDataType::Guid => "guid".to_string(),
        FieldDataType::Enum => {
            let name = field
                .enum_definition_id
                .and_then(|id| enum_names.get(&id).cloned())
                .unwrap_or_else(|| "Unresolved".to_string());
            if field.multi_select {
                format!("enum({}) multi", name)
            } else {
                format!("enum({})", name)
            }
        }
    }
}

fn fk_token(action: ForeignKeyAction) -> &'static str {
    match action {
        ForeignKeyAction::Restrict => "restrict",
        ForeignKeyAction::SetNull => "set_null",
        ForeignKeyAction::Cascade => "cascade",
    }
}

fn cascade_token(policy: CascadePolicy) -> &'static str {
    match policy {
        CascadePolicy::Cascade => "cascade",
        CascadePolicy::SetNull => "set_null",
        CascadePolicy::Restrict => "restrict",
        CascadePolicy::NoAction => "no_action",
    }
}
