use super::*;

#[derive(Debug, thiserror::Error)]
#[error("element not found: r1")]
struct Missing;

impl ErrorCode for Missing {
    fn error_code(&self) -> &'static str {
        "E_ELEMENT_NOT_FOUND"
    }

    fn status_code(&self) -> u16 {
        404
    }
}

#[test]
fn request_sets_fields() {
    let frame = Frame::request("addElement", Value::Null);
    assert_eq!(frame.event, "addElement");
    assert_eq!(frame.status, Status::Request);
    assert!(frame.parent_id.is_none());
    assert!(frame.ts > 0);
}

#[test]
fn done_inherits_context() {
    let board_id = Uuid::new_v4();
    let req = Frame::request("removeElement", json!("r1")).with_board_id(board_id);
    let done = req.done(json!({"id": "r1"}));

    assert_eq!(done.parent_id, Some(req.id));
    assert_eq!(done.board_id, Some(board_id));
    assert_eq!(done.event, "removeElement");
    assert_eq!(done.status, Status::Done);
}

#[test]
fn error_from_carries_status_code_and_message() {
    let req = Frame::request("removeElement", json!("r1"));
    let err = req.error_from(&Missing);

    assert_eq!(err.status, Status::Error);
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(err.message(), Some("element not found: r1"));
    assert_eq!(err.data["status"], "error");
    assert_eq!(err.data["code"], "E_ELEMENT_NOT_FOUND");
    assert_eq!(err.data["retryable"], false);
}

#[test]
fn wire_form_is_camel_case_and_lenient_on_input() {
    let frame = Frame::notify("elementRemoved", json!({"id": "r1"})).with_board_id(Uuid::nil());
    let value = serde_json::to_value(&frame).expect("serialize");
    assert!(value.get("boardId").is_some());
    assert!(value.get("parentId").is_none());
    assert_eq!(value["status"], "event");

    let inbound: Frame =
        serde_json::from_str(r#"{"id":"00000000-0000-0000-0000-000000000001","event":"addElement"}"#).expect("parse");
    assert_eq!(inbound.status, Status::Request);
    assert_eq!(inbound.data, Value::Null);
}
