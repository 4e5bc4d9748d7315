use dynentity::metadata::{
    CascadePolicy, FieldDataType, FieldMetadata, InterfaceKind, StructureKind,
};
use dynentity::{Aggregate, DetailEntry, DetailRows, EngineError, EntityEngine, JsonMap, QueryOptions};
use serde_json::json;
use uuid::Uuid;

fn payload(value: serde_json::Value) -> JsonMap {
    value.as_object().unwrap().clone()
}

fn record(value: serde_json::Value) -> DetailEntry {
    DetailEntry::Record(payload(value))
}

/// Published Order (head) + OrderLine (detail) pair with the given delete
/// policy on the detail.
async fn order_graph(engine: &EntityEngine, policy: CascadePolicy) -> (Uuid, Uuid) {
    let mut order = engine.new_entity("Order", "admin");
    order.structure_kind = StructureKind::MasterDetail;
    order.enable_interface(InterfaceKind::Base);
    order
        .upsert_field(
            FieldMetadata::new("Number", FieldDataType::String)
                .with_length(50)
                .required()
                .with_sort_order(1),
        )
        .unwrap();
    let order_id = engine.define_entity(order).await.unwrap();

    let mut line = engine.new_entity("OrderLine", "admin");
    line.enable_interface(InterfaceKind::Base);
    line.parent_entity_id = Some(order_id);
    line.parent_foreign_key_field = Some("OrderId".to_string());
    line.cascade_delete = policy;
    line.upsert_field(FieldMetadata::new("OrderId", FieldDataType::Integer).with_sort_order(1))
        .unwrap();
    line.upsert_field(FieldMetadata::new("Qty", FieldDataType::Integer).with_sort_order(2))
        .unwrap();
    let line_id = engine.define_entity(line).await.unwrap();

    let result = engine.publish(line_id, "admin").await.unwrap();
    assert!(result.success, "{:?}", result.error_message);
    let result = engine.publish(order_id, "admin").await.unwrap();
    assert!(result.success, "{:?}", result.error_message);

    (order_id, line_id)
}

fn sample_aggregate() -> Aggregate {
    Aggregate::new("Custom.Order", payload(json!({"Number": "SO-1"}))).with_details(DetailRows {
        entity_type: "Custom.OrderLine".to_string(),
        rows: vec![record(json!({"Qty": 2})), record(json!({"Qty": 5}))],
    })
}

#[tokio::test]
async fn test_save_stamps_parent_foreign_key() {
    let engine = EntityEngine::default();
    order_graph(&engine, CascadePolicy::Cascade).await;

    let head_id = engine
        .aggregates()
        .save(&sample_aggregate(), "alice")
        .await
        .unwrap();
    assert!(head_id > 0);

    let lines = engine
        .data()
        .query("Custom.OrderLine", &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l["OrderId"] == json!(head_id)));
}

#[tokio::test]
async fn test_load_returns_head_and_details() {
    let engine = EntityEngine::default();
    order_graph(&engine, CascadePolicy::Cascade).await;
    let head_id = engine
        .aggregates()
        .save(&sample_aggregate(), "alice")
        .await
        .unwrap();

    let loaded = engine
        .aggregates()
        .load("Custom.Order", head_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.head["Number"], json!("SO-1"));
    assert_eq!(loaded.details.len(), 1);
    assert_eq!(loaded.details[0].entity_type, "Custom.OrderLine");
    assert_eq!(loaded.details[0].rows.len(), 2);

    assert!(
        engine
            .aggregates()
            .load("Custom.Order", 999)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_save_updates_existing_head() {
    let engine = EntityEngine::default();
    order_graph(&engine, CascadePolicy::Cascade).await;
    let head_id = engine
        .aggregates()
        .save(&sample_aggregate(), "alice")
        .await
        .unwrap();

    let again = Aggregate::new(
        "Custom.Order",
        payload(json!({"Id": head_id, "Number": "SO-1-REV"})),
    );
    let second_id = engine.aggregates().save(&again, "alice").await.unwrap();
    assert_eq!(second_id, head_id);

    let head = engine
        .data()
        .get_by_id("Custom.Order", head_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(head["Number"], json!("SO-1-REV"));
}

#[tokio::test]
async fn test_delete_restrict_refuses_with_live_details() {
    let engine = EntityEngine::default();
    order_graph(&engine, CascadePolicy::Restrict).await;
    let head_id = engine
        .aggregates()
        .save(&sample_aggregate(), "alice")
        .await
        .unwrap();

    let err = engine
        .aggregates()
        .delete("Custom.Order", head_id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ConstraintViolation(_)));
    assert!(err.to_string().contains("Restrict"));

    // Head survives.
    assert!(
        engine
            .data()
            .get_by_id("Custom.Order", head_id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_delete_cascade_soft_deletes_details() {
    let engine = EntityEngine::default();
    order_graph(&engine, CascadePolicy::Cascade).await;
    let head_id = engine
        .aggregates()
        .save(&sample_aggregate(), "alice")
        .await
        .unwrap();

    assert!(
        engine
            .aggregates()
            .delete("Custom.Order", head_id, "alice")
            .await
            .unwrap()
    );

    assert!(
        engine
            .data()
            .get_by_id("Custom.Order", head_id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        engine
            .data()
            .query("Custom.OrderLine", &QueryOptions::new())
            .await
            .unwrap()
            .is_empty()
    );
    let all = engine
        .data()
        .query("Custom.OrderLine", &QueryOptions::new().with_deleted())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|l| l["IsDeleted"] == json!(true)));
}

#[tokio::test]
async fn test_delete_set_null_clears_foreign_key() {
    let engine = EntityEngine::default();
    order_graph(&engine, CascadePolicy::SetNull).await;
    let head_id = engine
        .aggregates()
        .save(&sample_aggregate(), "alice")
        .await
        .unwrap();

    assert!(
        engine
            .aggregates()
            .delete("Custom.Order", head_id, "alice")
            .await
            .unwrap()
    );

    let lines = engine
        .data()
        .query("Custom.OrderLine", &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l["OrderId"].is_null()));
}

#[tokio::test]
async fn test_cascade_save_opt_out_skips_details() {
    let engine = EntityEngine::default();
    let (_, line_id) = order_graph(&engine, CascadePolicy::Cascade).await;

    let mut line = engine.metadata().entity(line_id).await.unwrap();
    line.auto_cascade_save = false;
    engine.metadata().save_entity(line).await.unwrap();

    engine
        .aggregates()
        .save(&sample_aggregate(), "alice")
        .await
        .unwrap();
    assert!(
        engine
            .data()
            .query("Custom.OrderLine", &QueryOptions::new())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_save_rejects_stale_detail_id() {
    let engine = EntityEngine::default();
    order_graph(&engine, CascadePolicy::Cascade).await;

    let aggregate = Aggregate::new("Custom.Order", payload(json!({"Number": "SO-3"})))
        .with_details(DetailRows {
            entity_type: "Custom.OrderLine".to_string(),
            rows: vec![record(json!({"Id": 999, "Qty": 1}))],
        });
    let err = engine
        .aggregates()
        .save(&aggregate, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EntityNotFound(_)));
}

#[tokio::test]
async fn test_unknown_detail_set_rejected() {
    let engine = EntityEngine::default();
    order_graph(&engine, CascadePolicy::Cascade).await;

    let aggregate = Aggregate::new("Custom.Order", payload(json!({"Number": "SO-2"})))
        .with_details(DetailRows {
            entity_type: "Custom.Ghost".to_string(),
            rows: vec![record(json!({"Qty": 1}))],
        });
    let err = engine.aggregates().save(&aggregate, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
