use dropline_core::{MemberInfo, RoomCode, ServerMessage};
use dropline_server::RelayCommand;

use crate::integration::{create_test_relay, init_tracing, spawn_test_server};
use crate::utils::{TestClient, wait_for_deliveries};

#[tokio::test]
async fn test_single_peer_joins_room() {
    init_tracing();

    let (cmd_tx, mut signal_rx, _signaling) = create_test_relay();
    let peer = dropline_core::PeerId::new();
    let room = RoomCode::parse("abcd").unwrap();

    cmd_tx
        .send(RelayCommand::Join {
            peer_id: peer,
            room: room.clone(),
            name: Some("alice".into()),
        })
        .await
        .unwrap();

    let deliveries = wait_for_deliveries(&mut signal_rx, 2).await;
    assert_eq!(
        deliveries[0].msg,
        ServerMessage::Joined {
            peer_id: peer,
            room
        }
    );
    assert_eq!(
        deliveries[1].msg,
        ServerMessage::Presence {
            members: vec![MemberInfo {
                peer_id: peer,
                name: Some("alice".into()),
            }]
        }
    );
}

#[tokio::test]
async fn test_websocket_peer_gets_welcome_then_ice_config() {
    init_tracing();
    let addr = spawn_test_server().await;

    let mut client = TestClient::connect(addr).await.unwrap();
    assert!(!client.ice_servers.is_empty());

    let members = client.join_and_settle("abcd").await.unwrap();
    assert_eq!(members, vec![client.peer_id]);

    client.close().await.unwrap();
}
