use std::collections::BTreeMap;
use std::sync::Arc;

use dynentity::compiler::EntityCompiler;
use dynentity::metadata::MetadataStore;
use dynentity::{TypeRegistry, Value};

const ALPHA: &str = "entity Custom.Alpha table=alphas {\n  Id: integer pk\n  Name: string(50)\n}\n";
const BETA: &str =
    "entity Custom.Beta table=betas {\n  Id: integer pk\n  AlphaId: lookup(Alpha) on_delete=restrict\n}\n";

fn compiler() -> (EntityCompiler, Arc<TypeRegistry>) {
    let registry = Arc::new(TypeRegistry::new());
    (
        EntityCompiler::new(registry.clone(), MetadataStore::new()),
        registry,
    )
}

#[tokio::test]
async fn test_cross_unit_reference_resolves_in_one_call() {
    let (compiler, registry) = compiler();
    let mut units = BTreeMap::new();
    units.insert("alpha".to_string(), ALPHA.to_string());
    units.insert("beta".to_string(), BETA.to_string());

    let outcome = compiler.compile_multiple(&units).await;
    assert!(outcome.success, "{:?}", outcome.diagnostics);
    assert!(registry.contains("Custom.Alpha"));
    assert!(registry.contains("Custom.Beta"));

    let beta = registry.get("Custom.Beta").unwrap();
    assert_eq!(beta.lookups.len(), 1);
    assert_eq!(beta.lookups[0].target_type, "Custom.Alpha");
}

#[tokio::test]
async fn test_unresolved_reference_fails_compile_but_not_syntax() {
    let (compiler, registry) = compiler();

    assert!(compiler.validate_syntax(BETA).success);

    let outcome = compiler.compile(BETA, "beta").await;
    assert!(!outcome.success);
    assert!(outcome.diagnostics.iter().any(|d| d.code == "DE103"));
    assert!(!registry.contains("Custom.Beta"));
}

#[tokio::test]
async fn test_failed_unit_registers_nothing() {
    let (compiler, registry) = compiler();
    let mut units = BTreeMap::new();
    units.insert("alpha".to_string(), ALPHA.to_string());
    units.insert(
        "broken".to_string(),
        "entity Custom.Broken table=brokens {\n  Ref: lookup(Missing) on_delete=restrict\n}\n".to_string(),
    );

    let outcome = compiler.compile_multiple(&units).await;
    assert!(!outcome.success);
    // All-or-nothing: the valid unit is withheld too.
    assert!(!registry.contains("Custom.Alpha"));
    assert!(!registry.contains("Custom.Broken"));
}

#[tokio::test]
async fn test_recompilation_swaps_generation_without_breaking_holders() {
    let (compiler, registry) = compiler();
    assert!(compiler.compile(ALPHA, "alpha").await.success);
    let old = registry.get("Custom.Alpha").unwrap();

    let narrowed = "entity Custom.Alpha table=alphas {\n  Id: integer pk\n  Name: string(3)\n}\n";
    assert!(compiler.compile(narrowed, "alpha").await.success);
    let new = registry.get("Custom.Alpha").unwrap();

    assert!(old.validate_cell("Name", &Value::Text("abcdef".into())).is_ok());
    assert!(new.validate_cell("Name", &Value::Text("abcdef".into())).is_err());
}
