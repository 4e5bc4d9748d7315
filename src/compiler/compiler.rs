use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::{Column, DataType, RowSchema};
use crate::compiler::parser::{self, Diagnostic, EntityDecl, EntityProgram, FieldTypeDecl};
use crate::compiler::registry::{EntityType, EnumCheck, LookupBinding, TypeRegistry};
use crate::metadata::MetadataStore;

/// Result of a compilation attempt. Compilation never returns `Err`:
/// failures are expressed as diagnostics and `success = false`, and in
/// that case nothing is registered.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub registered: Vec<String>,
}

impl CompileOutcome {
    fn failure(diagnostics: Vec<Diagnostic>) -> Self {
        Self { success: false, diagnostics, registered: Vec::new() }
    }

    fn success(registered: Vec<String>) -> Self {
        Self { success: true, diagnostics: Vec::new(), registered }
    }
}

pub struct EntityCompiler {
    registry: Arc<TypeRegistry>,
    store: MetadataStore,
}

impl EntityCompiler {
    pub fn new(registry: Arc<TypeRegistry>, store: MetadataStore) -> Self {
        Self { registry, store }
    }

    /// Grammar-only check. Unresolved lookup or aggregate references are
    /// fine here; malformed tokens and unbalanced blocks are not.
    pub fn validate_syntax(&self, source: &str) -> CompileOutcome {
        match parser::parse(source) {
            Ok(_) => CompileOutcome::success(Vec::new()),
            Err(diagnostics) => CompileOutcome::failure(diagnostics),
        }
    }

    /// Compile one unit and swap the resulting types into the registry.
    pub async fn compile(&self, source: &str, unit_name: &str) -> CompileOutcome {
        let mut units = BTreeMap::new();
        units.insert(unit_name.to_string(), source.to_string());
        self.compile_multiple(&units).await
    }

    /// Compile several units together. References between units resolve in
    /// both directions; any diagnostic in any unit means nothing at all is
    /// registered.
    pub async fn compile_multiple(&self, units: &BTreeMap<String, String>) -> CompileOutcome {
        let mut diagnostics = Vec::new();
        let mut programs: Vec<(String, EntityProgram)> = Vec::new();

        for (file, source) in units {
            match parser::parse(source) {
                Ok(program) => programs.push((file.clone(), program)),
                Err(diags) => {
                    diagnostics.extend(diags.into_iter().map(|d| d.in_file(file.clone())));
                }
            }
        }
        if !diagnostics.is_empty() {
            warn!(count = diagnostics.len(), "compilation failed during parse");
            return CompileOutcome::failure(diagnostics);
        }

        // Names declared anywhere in this batch resolve before the registry.
        let mut declared: HashSet<String> = HashSet::new();
        for (file, program) in &programs {
            for decl in &program.entities {
                if !declared.insert(decl.full_name.clone()) {
                    diagnostics.push(
                        Diagnostic::new(
                            "DE102",
                            format!("Entity '{}' is declared more than once", decl.full_name),
                            decl.line,
                            1,
                        )
                        .in_file(file.clone()),
                    );
                }
            }
        }

        let mut types = Vec::new();
        for (file, program) in &programs {
            for decl in &program.entities {
                match self.analyze_entity(decl, &declared).await {
                    Ok(entity_type) => types.push(entity_type),
                    Err(diags) => {
                        diagnostics.extend(diags.into_iter().map(|d| d.in_file(file.clone())));
                    }
                }
            }
            for aggregate in &program.aggregates {
                diagnostics.extend(
                    self.check_aggregate(aggregate, program, &declared)
                        .into_iter()
                        .map(|d| d.in_file(file.clone())),
                );
            }
        }

        if !diagnostics.is_empty() {
            warn!(count = diagnostics.len(), "compilation failed during analysis");
            return CompileOutcome::failure(diagnostics);
        }

        let registered: Vec<String> = types.iter().map(|t| t.full_name.clone()).collect();
        self.registry.register_all(types);
        info!(types = ?registered, "entity types registered");
        CompileOutcome::success(registered)
    }

    async fn analyze_entity(
        &self,
        decl: &EntityDecl,
        declared: &HashSet<String>,
    ) -> Result<EntityType, Vec<Diagnostic>> {
        let mut diagnostics = Vec::new();
        let mut columns = Vec::new();
        let mut lookups = Vec::new();
        let mut enums = HashMap::new();
        let mut seen = HashSet::new();

        for field in &decl.fields {
            if !seen.insert(field.name.clone()) {
                diagnostics.push(Diagnostic::new(
                    "DE101",
                    format!("Duplicate field '{}' in entity '{}'", field.name, decl.full_name),
                    field.line,
                    1,
                ));
                continue;
            }

            let data_type = match &field.field_type {
                FieldTypeDecl::String { .. } | FieldTypeDecl::Enum { .. } => DataType::Text,
                FieldTypeDecl::Integer | FieldTypeDecl::Long => DataType::Integer,
                FieldTypeDecl::Decimal { .. } => DataType::Float,
                FieldTypeDecl::Boolean => DataType::Boolean,
                FieldTypeDecl::DateTime => DataType::Timestamp,
                FieldTypeDecl::Guid => DataType::Uuid,
                FieldTypeDecl::Lookup { target, on_delete } => {
                    match resolve_reference(target, declared, &self.registry) {
                        Some(full_name) => lookups.push(LookupBinding {
                            field: field.name.clone(),
                            target_type: full_name,
                            on_delete: *on_delete,
                        }),
                        None => diagnostics.push(Diagnostic::new(
                            "DE103",
                            format!(
                                "Unresolved lookup reference '{}' on field '{}'",
                                target, field.name
                            ),
                            field.line,
                            1,
                        )),
                    }
                    DataType::Integer
                }
            };

            if let FieldTypeDecl::Enum { name, multi } = &field.field_type {
                match self.store.enum_by_name(name).await {
                    Some(def) => {
                        enums.insert(
                            field.name.clone(),
                            EnumCheck {
                                keys: def.members.iter().map(|m| m.key.clone()).collect(),
                                multi: *multi,
                            },
                        );
                    }
                    None => diagnostics.push(Diagnostic::new(
                        "DE104",
                        format!("Unknown enum '{}' on field '{}'", name, field.name),
                        field.line,
                        1,
                    )),
                }
            }

            let mut column = Column::new(field.name.clone(), data_type);
            if field.primary_key {
                column = column.primary_key();
            } else if field.required {
                column = column.not_null();
            }
            if let FieldTypeDecl::String { length: Some(len) } = &field.field_type {
                column = column.with_max_length(*len);
            }
            columns.push(column);
        }

        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        let schema = RowSchema::new(columns);
        let soft_delete = schema.has_column("IsDeleted");
        let audited = schema.has_column("CreatedAt") && schema.has_column("UpdatedAt");
        Ok(EntityType {
            full_name: decl.full_name.clone(),
            table_name: decl.table_name(),
            schema,
            soft_delete,
            audited,
            lookups,
            enums,
        })
    }

    fn check_aggregate(
        &self,
        aggregate: &parser::AggregateDecl,
        program: &EntityProgram,
        declared: &HashSet<String>,
    ) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let resolves = |name: &str| declared.contains(name) || self.registry.contains(name);

        if !resolves(&aggregate.head) {
            diagnostics.push(Diagnostic::new(
                "DE105",
                format!("Aggregate '{}' head '{}' is not defined", aggregate.name, aggregate.head),
                aggregate.line,
                1,
            ));
        }
        for detail in &aggregate.details {
            if !resolves(&detail.target) {
                diagnostics.push(Diagnostic::new(
                    "DE105",
                    format!(
                        "Aggregate '{}' detail '{}' references undefined '{}'",
                        aggregate.name, detail.label, detail.target
                    ),
                    aggregate.line,
                    1,
                ));
                continue;
            }
            // When the detail entity is co-compiled, its FK field must exist.
            if let Some(decl) = program.entities.iter().find(|e| e.full_name == detail.target)
                && !decl.fields.iter().any(|f| f.name == detail.key)
            {
                diagnostics.push(Diagnostic::new(
                    "DE106",
                    format!(
                        "Aggregate '{}' key field '{}' does not exist on '{}'",
                        aggregate.name, detail.key, detail.target
                    ),
                    aggregate.line,
                    1,
                ));
            }
        }
        diagnostics
    }
}

/// Lookup targets are bare entity names; they resolve against co-compiled
/// declarations first, then the registry, by matching the name segment.
fn resolve_reference(
    target: &str,
    declared: &HashSet<String>,
    registry: &TypeRegistry,
) -> Option<String> {
    let suffix = format!(".{}", target);
    declared
        .iter()
        .find(|name| name.as_str() == target || name.ends_with(&suffix))
        .cloned()
        .or_else(|| {
            registry
                .loaded_types()
                .into_iter()
                .find(|name| name == target || name.ends_with(&suffix))
        })
}
