use bytes::Bytes;

use dropline_client::fake::FakeNetwork;
use dropline_client::{ClientEvent, Direction, OutgoingFile};

use crate::utils::{connect_client, init_tracing, spawn_relay, wait_for};

#[tokio::test]
async fn test_two_clients_exchange_a_file() {
    init_tracing();
    let endpoint = spawn_relay().await;
    let network = FakeNetwork::new();

    let (mut alice, alice_id) = connect_client(&endpoint, &network).await;
    let (mut bob, bob_id) = connect_client(&endpoint, &network).await;

    alice.join("abcd", Some("alice".into())).await.unwrap();
    wait_for(&mut alice, |e| matches!(e, ClientEvent::Joined { .. }).then_some(())).await;
    bob.join("abcd", Some("bob".into())).await.unwrap();

    let name = wait_for(&mut alice, |e| match e {
        ClientEvent::PeerJoined { peer_id, name } if *peer_id == bob_id => Some(name.clone()),
        _ => None,
    })
    .await;
    assert_eq!(name.as_deref(), Some("bob"));

    alice.connect_to(bob_id).await.unwrap();
    wait_for(&mut alice, |e| {
        matches!(e, ClientEvent::PeerConnected { peer_id } if *peer_id == bob_id).then_some(())
    })
    .await;
    wait_for(&mut bob, |e| {
        matches!(e, ClientEvent::PeerConnected { peer_id } if *peer_id == alice_id).then_some(())
    })
    .await;

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let sent_id = alice
        .send_file(
            bob_id,
            OutgoingFile::from_bytes("notes.txt", "text/plain", Bytes::from(payload.clone())),
        )
        .await
        .unwrap();

    let file = wait_for(&mut bob, |e| match e {
        ClientEvent::FileReceived { peer_id, file, .. } if *peer_id == alice_id => {
            Some(file.clone())
        }
        _ => None,
    })
    .await;
    assert_eq!(file.metadata.file_name, "notes.txt");
    assert_eq!(file.metadata.file_type, "text/plain");
    assert_eq!(file.metadata.file_size, payload.len() as u64);
    assert_eq!(file.data.as_ref(), payload.as_slice());

    let (direction, bytes) = wait_for(&mut alice, |e| match e {
        ClientEvent::TransferCompleted {
            transfer_id,
            direction,
            bytes,
            ..
        } if *transfer_id == sent_id => Some((*direction, *bytes)),
        _ => None,
    })
    .await;
    assert_eq!(direction, Direction::Outgoing);
    assert_eq!(bytes, payload.len() as u64);

    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn test_send_before_connect_negotiates_and_delivers() {
    init_tracing();
    let endpoint = spawn_relay().await;
    let network = FakeNetwork::new();

    let (mut alice, _) = connect_client(&endpoint, &network).await;
    let (mut bob, bob_id) = connect_client(&endpoint, &network).await;

    alice.join("queue1", None).await.unwrap();
    wait_for(&mut alice, |e| matches!(e, ClientEvent::Joined { .. }).then_some(())).await;
    bob.join("queue1", None).await.unwrap();
    wait_for(&mut alice, |e| {
        matches!(e, ClientEvent::PeerJoined { peer_id, .. } if *peer_id == bob_id).then_some(())
    })
    .await;

    // No explicit connect: the file waits in the queue until the channel opens.
    alice
        .send_file(
            bob_id,
            OutgoingFile::from_bytes("empty.bin", "application/octet-stream", Bytes::new()),
        )
        .await
        .unwrap();
    alice
        .send_file(
            bob_id,
            OutgoingFile::from_bytes("hello.txt", "text/plain", Bytes::from_static(b"hello")),
        )
        .await
        .unwrap();

    let first = wait_for(&mut bob, |e| match e {
        ClientEvent::FileReceived { file, .. } => Some(file.clone()),
        _ => None,
    })
    .await;
    assert_eq!(first.metadata.file_name, "empty.bin");
    assert!(first.data.is_empty());

    let second = wait_for(&mut bob, |e| match e {
        ClientEvent::FileReceived { file, .. } => Some(file.clone()),
        _ => None,
    })
    .await;
    assert_eq!(second.metadata.file_name, "hello.txt");
    assert_eq!(second.data, Bytes::from_static(b"hello"));

    alice.shutdown().await;
    bob.shutdown().await;
}
