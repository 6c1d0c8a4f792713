use dropline_server::RegisteredDirectory;
use serde_json::Value;
use std::sync::Arc;

use crate::integration::{init_tracing, spawn_test_server_with};

#[tokio::test]
async fn test_room_http_routes() {
    init_tracing();
    let addr = spawn_test_server_with(Arc::new(RegisteredDirectory::new())).await;
    let http = reqwest::Client::new();

    let created = http
        .post(format!("http://{addr}/rooms"))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), reqwest::StatusCode::CREATED);
    let body: Value = created.json().await.unwrap();
    let code = body["code"].as_str().unwrap().to_owned();

    let found: Value = http
        .get(format!("http://{addr}/rooms/{code}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["exists"], Value::Bool(true));

    let missing: Value = http
        .get(format!("http://{addr}/rooms/zzzzzz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(missing["exists"], Value::Bool(false));
}
