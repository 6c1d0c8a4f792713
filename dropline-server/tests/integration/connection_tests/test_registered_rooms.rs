use dropline_core::ServerMessage;
use dropline_server::RegisteredDirectory;
use std::sync::Arc;

use crate::integration::{init_tracing, spawn_test_server_with};
use crate::utils::TestClient;

#[tokio::test]
async fn test_unknown_room_is_rejected() {
    init_tracing();
    let addr = spawn_test_server_with(Arc::new(RegisteredDirectory::new())).await;

    let mut client = TestClient::connect(addr).await.unwrap();
    client.join("nosuchroom", None).await.unwrap();

    let ServerMessage::Error { message } = client.recv().await.unwrap() else {
        panic!("expected an error reply");
    };
    assert!(message.contains("nosuchroom"));
}

#[tokio::test]
async fn test_created_room_can_be_joined() {
    init_tracing();
    let directory = Arc::new(RegisteredDirectory::new());
    let addr = spawn_test_server_with(directory.clone()).await;

    let code = dropline_server::RoomDirectory::create_room_record(directory.as_ref())
        .await
        .unwrap();

    let mut client = TestClient::connect(addr).await.unwrap();
    let members = client.join_and_settle(code.as_str()).await.unwrap();
    assert_eq!(members, vec![client.peer_id]);
}
