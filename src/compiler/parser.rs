//! Line-oriented parser for the entity DSL the source generator emits.
//!
//! Parsing is purely syntactic: lookup targets, enum names and aggregate
//! references are captured as names and resolved later by the compiler.
//! Errors are collected as positioned diagnostics rather than failing on
//! the first problem.

use std::fmt;

use crate::metadata::{CascadePolicy, ForeignKeyAction, is_valid_identifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub file: Option<String>,
}

impl Diagnostic {
    pub fn new(code: &'static str, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            code,
            message: message.into(),
            line,
            column,
            file: None,
        }
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(
                f,
                "{} [{}:{}:{}] {}",
                self.code, file, self.line, self.column, self.message
            ),
            None => write!(f, "{} [{}:{}] {}", self.code, self.line, self.column, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityProgram {
    pub entities: Vec<EntityDecl>,
    pub aggregates: Vec<AggregateDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDecl {
    pub full_name: String,
    /// Physical table override; defaults to the pluralized name segment.
    pub table: Option<String>,
    pub fields: Vec<FieldDecl>,
    pub line: usize,
}

impl EntityDecl {
    pub fn table_name(&self) -> String {
        self.table.clone().unwrap_or_else(|| {
            let segment = self.full_name.rsplit('.').next().unwrap_or(&self.full_name);
            format!("{}s", segment).to_lowercase()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub field_type: FieldTypeDecl,
    pub required: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldTypeDecl {
    String { length: Option<u32> },
    Integer,
    Long,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    DateTime,
    Guid,
    Enum { name: String, multi: bool },
    Lookup { target: String, on_delete: ForeignKeyAction },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateDecl {
    pub name: String,
    pub head: String,
    pub details: Vec<DetailDecl>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailDecl {
    pub label: String,
    pub target: String,
    pub key: String,
    pub on_delete: CascadePolicy,
}

enum Block {
    Entity(EntityDecl),
    Aggregate(AggregateDecl),
}

/// Parse a compilation unit. Returns the program, or every syntax
/// diagnostic found.
pub fn parse(source: &str) -> Result<EntityProgram, Vec<Diagnostic>> {
    let mut entities = Vec::new();
    let mut aggregates = Vec::new();
    let mut diagnostics = Vec::new();
    let mut current: Option<Block> = None;

    for (line_idx, raw_line) in source.lines().enumerate() {
        let line_no = line_idx + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if line == "}" && current.is_some() {
            match current.take() {
                Some(Block::Entity(decl)) => entities.push(decl),
                Some(Block::Aggregate(decl)) => aggregates.push(decl),
                None => {}
            }
            continue;
        }

        if let Some(block) = current.as_mut() {
            match block {
                Block::Entity(decl) => match parse_field(raw_line, line, line_no) {
                    Ok(field) => decl.fields.push(field),
                    Err(diag) => diagnostics.push(diag),
                },
                Block::Aggregate(decl) => {
                    if let Err(diag) = parse_aggregate_member(raw_line, line, line_no, decl) {
                        diagnostics.push(diag);
                    }
                }
            }
            continue;
        }

        match parse_block_header(raw_line, line, line_no) {
            Ok(block) => current = Some(block),
            Err(diag) => diagnostics.push(diag),
        }
    }

    match current {
        Some(Block::Entity(decl)) => diagnostics.push(Diagnostic::new(
            "DE007",
            format!("Unclosed entity '{}' (missing closing '}}')", decl.full_name),
            decl.line,
            1,
        )),
        Some(Block::Aggregate(decl)) => diagnostics.push(Diagnostic::new(
            "DE007",
            format!("Unclosed aggregate '{}' (missing closing '}}')", decl.name),
            decl.line,
            1,
        )),
        None => {}
    }

    if diagnostics.is_empty() {
        Ok(EntityProgram { entities, aggregates })
    } else {
        Err(diagnostics)
    }
}

fn parse_block_header(raw_line: &str, line: &str, line_no: usize) -> Result<Block, Diagnostic> {
    if let Some(rest) = line.strip_prefix("entity ") {
        let (name, table) = header_name(rest, raw_line, line_no, "entity")?;
        return Ok(Block::Entity(EntityDecl {
            full_name: name,
            table,
            fields: Vec::new(),
            line: line_no,
        }));
    }
    if let Some(rest) = line.strip_prefix("aggregate ") {
        let (name, _) = header_name(rest, raw_line, line_no, "aggregate")?;
        return Ok(Block::Aggregate(AggregateDecl {
            name,
            head: String::new(),
            details: Vec::new(),
            line: line_no,
        }));
    }
    Err(Diagnostic::new(
        "DE001",
        format!("Expected 'entity <name> {{' or 'aggregate <name> {{', found '{}'", line),
        line_no,
        column_of(raw_line, line),
    ))
}

/// Parse `<Name> [table=<ident>] {` after a block keyword. Returns the
/// qualified name and the optional table override.
fn header_name(
    rest: &str,
    raw_line: &str,
    line_no: usize,
    keyword: &str,
) -> Result<(String, Option<String>), Diagnostic> {
    let rest = rest.trim();
    let Some(name_part) = rest.strip_suffix('{') else {
        return Err(Diagnostic::new(
            "DE002",
            format!("{} declaration must end with '{{'", keyword),
            line_no,
            raw_line.len() + 1,
        ));
    };
    let mut tokens = name_part.split_whitespace();
    let name = tokens.next().unwrap_or("");
    if !is_qualified_name(name) {
        return Err(Diagnostic::new(
            "DE003",
            format!("Invalid {} name '{}'", keyword, name),
            line_no,
            column_of(raw_line, name),
        ));
    }

    let mut table = None;
    for token in tokens {
        let Some(value) = token.strip_prefix("table=") else {
            return Err(Diagnostic::new(
                "DE002",
                format!("Unexpected token '{}' in {} header", token, keyword),
                line_no,
                column_of(raw_line, token),
            ));
        };
        if !is_valid_identifier(value) {
            return Err(Diagnostic::new(
                "DE003",
                format!("Invalid table name '{}'", value),
                line_no,
                column_of(raw_line, value),
            ));
        }
        table = Some(value.to_string());
    }
    Ok((name.to_string(), table))
}

fn parse_field(raw_line: &str, line: &str, line_no: usize) -> Result<FieldDecl, Diagnostic> {
    let line = line.trim_end_matches(',').trim();
    let Some((name_raw, rhs)) = line.split_once(':') else {
        return Err(Diagnostic::new(
            "DE004",
            "Expected field format '<name>: <type> [modifiers]'",
            line_no,
            column_of(raw_line, line),
        ));
    };

    let name = name_raw.trim();
    if !is_valid_identifier(name) {
        return Err(Diagnostic::new(
            "DE003",
            format!("Invalid field name '{}'", name),
            line_no,
            column_of(raw_line, name),
        ));
    }

    let mut tokens: Vec<&str> = rhs.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(Diagnostic::new(
            "DE004",
            format!("Field '{}' is missing a type", name),
            line_no,
            column_of(raw_line, name),
        ));
    }

    let type_token = tokens.remove(0);
    let mut field_type = parse_type_token(type_token).ok_or_else(|| {
        Diagnostic::new(
            "DE005",
            format!("Unknown type '{}'", type_token),
            line_no,
            column_of(raw_line, type_token),
        )
    })?;

    let mut required = false;
    let mut unique = false;
    let mut primary_key = false;

    for token in tokens {
        let lowered = token.to_ascii_lowercase();
        match lowered.as_str() {
            "pk" | "primary_key" => primary_key = true,
            "required" | "not_null" => required = true,
            "unique" => unique = true,
            "multi" => match &mut field_type {
                FieldTypeDecl::Enum { multi, .. } => *multi = true,
                _ => {
                    return Err(Diagnostic::new(
                        "DE006",
                        "'multi' is only valid on enum fields",
                        line_no,
                        column_of(raw_line, token),
                    ));
                }
            },
            _ if lowered.starts_with("on_delete=") => {
                let action = &lowered["on_delete=".len()..];
                match &mut field_type {
                    FieldTypeDecl::Lookup { on_delete, .. } => {
                        *on_delete = parse_fk_action(action).ok_or_else(|| {
                            Diagnostic::new(
                                "DE006",
                                format!("Unknown on_delete action '{}'", action),
                                line_no,
                                column_of(raw_line, token),
                            )
                        })?;
                    }
                    _ => {
                        return Err(Diagnostic::new(
                            "DE006",
                            "'on_delete' is only valid on lookup fields",
                            line_no,
                            column_of(raw_line, token),
                        ));
                    }
                }
            }
            _ => {
                return Err(Diagnostic::new(
                    "DE006",
                    format!("Unknown field modifier '{}'", token),
                    line_no,
                    column_of(raw_line, token),
                ));
            }
        }
    }

    if primary_key {
        required = true;
        unique = true;
    }

    Ok(FieldDecl {
        name: name.to_string(),
        field_type,
        required,
        unique,
        primary_key,
        line: line_no,
    })
}

fn parse_aggregate_member(
    raw_line: &str,
    line: &str,
    line_no: usize,
    decl: &mut AggregateDecl,
) -> Result<(), Diagnostic> {
    if let Some(rest) = line.strip_prefix("head:") {
        let head = rest.trim();
        if !is_qualified_name(head) {
            return Err(Diagnostic::new(
                "DE003",
                format!("Invalid head reference '{}'", head),
                line_no,
                column_of(raw_line, head),
            ));
        }
        decl.head = head.to_string();
        return Ok(());
    }

    if let Some(rest) = line.strip_prefix("detail ") {
        // detail <Label>: <Full.Name> key <FkField> on_delete=<policy>
        let Some((label_raw, tail)) = rest.split_once(':') else {
            return Err(Diagnostic::new(
                "DE008",
                "Expected 'detail <name>: <target> key <field> on_delete=<policy>'",
                line_no,
                column_of(raw_line, rest),
            ));
        };
        let label = label_raw.trim();
        let tokens: Vec<&str> = tail.split_whitespace().collect();
        if !is_valid_identifier(label) || tokens.len() != 4 || tokens[1] != "key" {
            return Err(Diagnostic::new(
                "DE008",
                "Expected 'detail <name>: <target> key <field> on_delete=<policy>'",
                line_no,
                column_of(raw_line, label),
            ));
        }
        let target = tokens[0];
        let key = tokens[2];
        let policy_token = tokens[3]
            .strip_prefix("on_delete=")
            .ok_or_else(|| {
                Diagnostic::new(
                    "DE008",
                    format!("Expected 'on_delete=<policy>', found '{}'", tokens[3]),
                    line_no,
                    column_of(raw_line, tokens[3]),
                )
            })?;
        let on_delete = parse_cascade(policy_token).ok_or_else(|| {
            Diagnostic::new(
                "DE006",
                format!("Unknown on_delete policy '{}'", policy_token),
                line_no,
                column_of(raw_line, policy_token),
            )
        })?;
        if !is_qualified_name(target) || !is_valid_identifier(key) {
            return Err(Diagnostic::new(
                "DE003",
                format!("Invalid detail reference '{}'", target),
                line_no,
                column_of(raw_line, target),
            ));
        }
        decl.details.push(DetailDecl {
            label: label.to_string(),
            target: target.to_string(),
            key: key.to_string(),
            on_delete,
        });
        return Ok(());
    }

    Err(Diagnostic::new(
        "DE008",
        format!("Expected 'head:' or 'detail' inside aggregate, found '{}'", line),
        line_no,
        column_of(raw_line, line),
    ))
}

fn parse_type_token(token: &str) -> Option<FieldTypeDecl> {
    if let Some(args) = call_args(token, "string") {
        return args.parse::<u32>().ok().map(|len| FieldTypeDecl::String {
            length: Some(len),
        });
    }
    if let Some(args) = call_args(token, "decimal") {
        let (p, s) = args.split_once(',')?;
        return Some(FieldTypeDecl::Decimal {
            precision: p.trim().parse().ok()?,
            scale: s.trim().parse().ok()?,
        });
    }
    if let Some(args) = call_args(token, "enum") {
        if !is_valid_identifier(args) {
            return None;
        }
        return Some(FieldTypeDecl::Enum {
            name: args.to_string(),
            multi: false,
        });
    }
    if let Some(args) = call_args(token, "lookup") {
        if !is_valid_identifier(args) {
            return None;
        }
        return Some(FieldTypeDecl::Lookup {
            target: args.to_string(),
            on_delete: ForeignKeyAction::Restrict,
        });
    }

    match token.to_ascii_lowercase().as_str() {
        "string" | "text" => Some(FieldTypeDecl::String { length: None }),
        "integer" | "int" => Some(FieldTypeDecl::Integer),
        "long" | "bigint" => Some(FieldTypeDecl::Long),
        "decimal" => Some(FieldTypeDecl::Decimal { precision: 18, scale: 2 }),
        "boolean" | "bool" => Some(FieldTypeDecl::Boolean),
        "datetime" | "timestamp" => Some(FieldTypeDecl::DateTime),
        "guid" | "uuid" => Some(FieldTypeDecl::Guid),
        _ => None,
    }
}

/// For `name(args)` tokens, return the argument text.
fn call_args<'a>(token: &'a str, name: &str) -> Option<&'a str> {
    token
        .strip_prefix(name)?
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn parse_fk_action(token: &str) -> Option<ForeignKeyAction> {
    match token {
        "restrict" => Some(ForeignKeyAction::Restrict),
        "set_null" => Some(ForeignKeyAction::SetNull),
        "cascade" => Some(ForeignKeyAction::Cascade),
        _ => None,
    }
}

fn parse_cascade(token: &str) -> Option<CascadePolicy> {
    match token {
        "cascade" => Some(CascadePolicy::Cascade),
        "set_null" => Some(CascadePolicy::SetNull),
        "restrict" => Some(CascadePolicy::Restrict),
        "no_action" => Some(CascadePolicy::NoAction),
        _ => None,
    }
}

fn strip_comment(line: &str) -> &str {
    line.split_once("//").map_or(line, |(head, _)| head)
}

fn is_qualified_name(value: &str) -> bool {
    !value.is_empty() && value.split('.').all(is_valid_identifier)
}

fn column_of(raw_line: &str, token: &str) -> usize {
    raw_line.find(token).map_or(1, |idx| idx + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
entity Custom.Product {
  Id: integer pk
  Name: string(200) required
  Price: decimal(18,2)
  CategoryId: lookup(Category) on_delete=set_null
  Status: enum(ProductStatus) multi
}
";

    #[test]
    fn test_parse_entity() {
        let program = parse(SOURCE).unwrap();
        assert_eq!(program.entities.len(), 1);
        let entity = &program.entities[0];
        assert_eq!(entity.full_name, "Custom.Product");
        assert_eq!(entity.fields.len(), 5);
        assert!(entity.fields[0].primary_key);
        assert_eq!(
            entity.fields[3].field_type,
            FieldTypeDecl::Lookup {
                target: "Category".to_string(),
                on_delete: ForeignKeyAction::SetNull,
            }
        );
        assert_eq!(
            entity.fields[4].field_type,
            FieldTypeDecl::Enum { name: "ProductStatus".to_string(), multi: true }
        );
    }

    #[test]
    fn test_table_override() {
        let source = "entity Custom.Person table=people {\n  Id: integer pk\n}\n";
        let program = parse(source).unwrap();
        assert_eq!(program.entities[0].table_name(), "people");

        let defaulted = parse("entity Custom.Product {\n  Id: integer pk\n}\n").unwrap();
        assert_eq!(defaulted.entities[0].table_name(), "products");
    }

    #[test]
    fn test_unresolved_lookup_is_syntactically_valid() {
        let source = "entity Custom.A {\n  BId: lookup(DoesNotExist)\n}\n";
        assert!(parse(source).is_ok());
    }

    #[test]
    fn test_missing_brace_is_reported_with_position() {
        let source = "entity Custom.A {\n  Id: integer pk\n";
        let diags = parse(source).unwrap_err();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "DE007");
        assert_eq!(diags[0].line, 1);
    }

    #[test]
    fn test_unknown_type_reports_column() {
        let source = "entity Custom.A {\n  Id: wibble\n}\n";
        let diags = parse(source).unwrap_err();
        assert_eq!(diags[0].code, "DE005");
        assert_eq!(diags[0].line, 2);
        assert_eq!(diags[0].column, 7);
    }

    #[test]
    fn test_parse_aggregate() {
        let source = "\
aggregate Custom.OrderAgg {
  head: Custom.Order
  detail Lines: Custom.OrderLine key OrderId on_delete=cascade
}
";
        let program = parse(source).unwrap();
        assert_eq!(program.aggregates.len(), 1);
        let agg = &program.aggregates[0];
        assert_eq!(agg.head, "Custom.Order");
        assert_eq!(agg.details[0].key, "OrderId");
        assert_eq!(agg.details[0].on_delete, CascadePolicy::Cascade);
    }

    #[test]
    fn test_multiple_diagnostics_collected() {
        let source = "entity Custom.A {\n  Id: wibble\n  Name string\n}\n";
        let diags = parse(source).unwrap_err();
        assert_eq!(diags.len(), 2);
    }
}
