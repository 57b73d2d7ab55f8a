use super::*;
use crate::state::test_helpers;
use reqwest::StatusCode as Http;
use uuid::Uuid;

async fn create(client: &reqwest::Client, base: &str, section_id: Uuid, name: &str) -> reqwest::Response {
    client
        .post(format!("{base}/boards"))
        .json(&json!({"projectId": Uuid::new_v4(), "sectionId": section_id, "name": name, "type": "board"}))
        .send()
        .await
        .expect("request")
}

#[tokio::test]
async fn board_crud_over_http() {
    let addr = test_helpers::spawn_app(test_helpers::test_app_state()).await;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();
    let section_id = Uuid::new_v4();

    let res = create(&client, &base, section_id, "Plan").await;
    assert_eq!(res.status(), Http::CREATED);
    let board: Value = res.json().await.expect("json");
    let id = board["id"].as_str().expect("id").to_owned();
    assert_eq!(board["layerIds"].as_array().map(Vec::len), Some(3));

    let dup = create(&client, &base, section_id, "Plan").await;
    assert_eq!(dup.status(), Http::CONFLICT);
    let body: Value = dup.json().await.expect("json");
    assert_eq!(body["code"], "E_DUPLICATE_NAME");

    let snapshot: Value = client
        .get(format!("{base}/boards/{id}"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(snapshot["layers"].as_array().map(Vec::len), Some(3));

    let renamed = client
        .put(format!("{base}/boards/{id}/title"))
        .json(&json!({"name": "Plan v2"}))
        .send()
        .await
        .expect("request");
    assert_eq!(renamed.status(), Http::OK);
    assert_eq!(renamed.json::<Value>().await.expect("json")["name"], "Plan v2");

    let deleted = client.delete(format!("{base}/boards/{id}")).send().await.expect("request");
    assert_eq!(deleted.status(), Http::OK);
    let gone = client.get(format!("{base}/boards/{id}")).send().await.expect("request");
    assert_eq!(gone.status(), Http::NOT_FOUND);
    let gone = client.delete(format!("{base}/boards/{id}")).send().await.expect("request");
    assert_eq!(gone.status(), Http::NOT_FOUND);
}

#[tokio::test]
async fn malformed_ids_and_bodies_are_bad_requests() {
    let addr = test_helpers::spawn_app(test_helpers::test_app_state()).await;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let res = client.get(format!("{base}/boards/nope")).send().await.expect("request");
    assert_eq!(res.status(), Http::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await.expect("json")["code"], "E_MALFORMED_ID");

    let res = client
        .post(format!("{base}/boards"))
        .json(&json!({"name": "missing ids"}))
        .send()
        .await
        .expect("request");
    assert_eq!(res.status(), Http::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await.expect("json")["code"], "E_INVALID_BODY");

    let res = client
        .put(format!("{base}/boards/{}/title", Uuid::new_v4()))
        .json(&json!({"name": "x"}))
        .send()
        .await
        .expect("request");
    assert_eq!(res.status(), Http::NOT_FOUND);
}

#[tokio::test]
async fn delete_can_keep_section_reference() {
    let state = test_helpers::test_app_state();
    let board = test_helpers::seed_board(&state).await;
    let addr = test_helpers::spawn_app(state.clone()).await;

    let res = reqwest::Client::new()
        .delete(format!("http://{addr}/boards/{}?detachSection=false", board.id))
        .send()
        .await
        .expect("request");
    assert_eq!(res.status(), Http::OK);
    assert_eq!(state.store.section_boards(board.section_id).await.expect("section"), vec![board.id]);
}
