use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use dropline_client::{Client, ClientEvent, CloseReason, Direction, OutgoingFile, TransferId};
use dropline_core::{Delivery, ForwardKind, PeerId, SessionDescription};

use crate::utils::{FailAt, FailingFactory, ScriptedRelay, collect_until, init_tracing, wait_for};

fn small_file() -> OutgoingFile {
    OutgoingFile::from_bytes(
        "note.txt",
        "text/plain",
        Bytes::from_static(b"never delivered"),
    )
}

/// Collects events until both the negotiation failure and the abort of `id` show up.
async fn failure_and_abort(
    client: &mut Client,
    remote: PeerId,
    id: TransferId,
) -> (CloseReason, String) {
    let mut reason = None;
    let mut aborted = None;
    collect_until(client, |e| {
        match e {
            ClientEvent::PeerDisconnected { peer_id, reason: r } if *peer_id == remote => {
                reason = Some(r.clone());
            }
            ClientEvent::TransferAborted {
                transfer_id,
                direction: Direction::Outgoing,
                reason: r,
                ..
            } if *transfer_id == id => aborted = Some(r.clone()),
            _ => {}
        }
        reason.is_some() && aborted.is_some()
    })
    .await;
    (reason.unwrap(), aborted.unwrap())
}

async fn started(fail_at: FailAt) -> (Client, ScriptedRelay, FailingFactory, PeerId) {
    init_tracing();
    let factory = FailingFactory::new(fail_at);
    let (mut client, relay) = ScriptedRelay::start_with(Arc::new(factory.clone()), PeerId::new());
    wait_for(&mut client, |e| matches!(e, ClientEvent::Welcome { .. }).then_some(())).await;
    (client, relay, factory, PeerId::new())
}

#[tokio::test]
async fn test_transport_setup_failure_drops_pending_file() {
    let (mut client, _relay, _factory, remote) = started(FailAt::Create).await;

    let id = client.send_file(remote, small_file()).await.unwrap();
    let (reason, aborted) = failure_and_abort(&mut client, remote, id).await;

    assert!(matches!(reason, CloseReason::NegotiationFailed(_)), "{reason:?}");
    assert_eq!(aborted, "no connection to peer");

    client.shutdown().await;
}

#[tokio::test]
async fn test_offer_failure_drops_pending_file() {
    let (mut client, mut relay, _factory, remote) = started(FailAt::Offer).await;

    let id = client.send_file(remote, small_file()).await.unwrap();
    let (reason, _) = failure_and_abort(&mut client, remote, id).await;

    assert!(matches!(reason, CloseReason::NegotiationFailed(_)), "{reason:?}");
    assert!(relay.sends_no(ForwardKind::Offer, Duration::from_millis(100)).await);

    client.shutdown().await;
}

#[tokio::test]
async fn test_rejected_answer_drops_queued_file() {
    let (mut client, mut relay, factory, remote) = started(FailAt::Answer).await;

    let id = client.send_file(remote, small_file()).await.unwrap();
    let (target, _) = relay.expect_forward(ForwardKind::Offer).await;
    assert_eq!(target, remote);

    relay.forward_from(remote, ForwardKind::Answer, &SessionDescription::answer("v=0"));
    let (reason, aborted) = failure_and_abort(&mut client, remote, id).await;

    assert!(matches!(reason, CloseReason::NegotiationFailed(_)), "{reason:?}");
    assert_eq!(aborted, reason.to_string());

    // File frames depend on ordered reliable delivery, whatever the caller configured.
    let configs = factory.configs();
    assert_eq!(configs.len(), 1);
    assert!(configs.iter().all(|c| c.delivery == Delivery::Reliable));

    client.shutdown().await;
}

#[tokio::test]
async fn test_rejected_offer_closes_session_without_answer() {
    let (mut client, mut relay, _factory, remote) = started(FailAt::Accept).await;

    relay.forward_from(remote, ForwardKind::Offer, &SessionDescription::offer("v=0"));
    let reason = wait_for(&mut client, |e| match e {
        ClientEvent::PeerDisconnected { peer_id, reason } if *peer_id == remote => {
            Some(reason.clone())
        }
        _ => None,
    })
    .await;

    assert!(matches!(reason, CloseReason::NegotiationFailed(_)), "{reason:?}");
    assert!(relay.sends_no(ForwardKind::Answer, Duration::from_millis(100)).await);

    client.shutdown().await;
}
