use super::*;
use model::ErrorCode;
use serde_json::json;

fn layer_with(elements: Vec<Element>) -> LayerRecord {
    LayerRecord { id: Uuid::new_v4(), board_id: Uuid::new_v4(), layer_number: 0, elements, version: 0 }
}

fn rect(id: &str) -> Element {
    Element::from_value(json!({"type": "rect", "id": id, "x": 0, "y": 0, "width": 10, "height": 10}))
        .expect("valid rect")
}

#[test]
fn encode_layer_returns_element_array() {
    let layer = layer_with(vec![rect("r1"), rect("r2")]);
    let document = encode_layer(&layer, 1024).expect("encode");
    let ids: Vec<&str> = document
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|e| e.get("id").and_then(serde_json::Value::as_str))
        .collect();
    assert_eq!(ids, vec!["r1", "r2"]);
}

#[test]
fn encode_layer_rejects_documents_over_the_ceiling() {
    let layer = layer_with(vec![rect("r1")]);
    let err = encode_layer(&layer, 16).unwrap_err();
    assert!(matches!(err, StoreError::PayloadTooLarge { limit: 16, .. }));
    assert_eq!(err.status_code(), 413);
}

#[test]
fn store_error_status_codes() {
    let dup = StoreError::DuplicateName { section_id: Uuid::nil(), name: "Plan".into() };
    assert_eq!(dup.status_code(), 409);
    assert_eq!(dup.error_code(), "E_DUPLICATE_NAME");

    let conflict = StoreError::Conflict(Uuid::nil());
    assert_eq!(conflict.status_code(), 409);
    assert!(conflict.retryable());
    assert!(!dup.retryable());
}

#[test]
fn new_board_defaults_type() {
    let new: NewBoard = serde_json::from_value(json!({
        "projectId": Uuid::nil(),
        "sectionId": Uuid::nil(),
        "name": "Plan"
    }))
    .expect("deserialize");
    assert_eq!(new.board_type, "board");
}

#[test]
fn board_record_serializes_camel_case_with_type_tag() {
    let now = OffsetDateTime::UNIX_EPOCH;
    let board = BoardRecord {
        id: Uuid::nil(),
        name: "Plan".into(),
        board_type: "board".into(),
        project_id: Uuid::nil(),
        section_id: Uuid::nil(),
        layer_ids: vec![Uuid::nil()],
        created_at: now,
        updated_at: now,
    };
    let value = serde_json::to_value(&board).expect("serialize");
    assert_eq!(value["type"], "board");
    assert_eq!(value["layerIds"].as_array().map(Vec::len), Some(1));
    assert_eq!(value["createdAt"], "1970-01-01T00:00:00Z");
}
