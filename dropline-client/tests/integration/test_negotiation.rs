use std::time::Duration;

use dropline_client::fake::FakeNetwork;
use dropline_client::{ClientEvent, CloseReason, TransportEvent};
use dropline_core::{ForwardKind, IceCandidate, PeerId, SessionDescription};

use crate::utils::{
    EVENT_TIMEOUT, ScriptedRelay, collect_until, init_tracing, ordered_ids, remote_transport,
    wait_for,
};

fn candidate(tag: &str) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{tag} 1 udp 2122260223 10.0.0.9 50000 typ host"),
        sdp_mid: Some("0".into()),
        sdp_m_line_index: Some(0),
    }
}

async fn wait_for_applied(network: &FakeNetwork, from: PeerId, count: usize) -> Vec<IceCandidate> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let applied = network.candidates_from(from).await;
            if applied.len() >= count {
                return applied;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timed out waiting for applied candidates")
}

#[tokio::test]
async fn test_unanswered_offer_times_out() {
    init_tracing();
    let network = FakeNetwork::new();
    let (local, remote) = (PeerId::new(), PeerId::new());
    let (mut client, mut relay) = ScriptedRelay::start(&network, local);
    wait_for(&mut client, |e| matches!(e, ClientEvent::Welcome { .. }).then_some(())).await;

    client.connect_to(remote).await.unwrap();
    let (target, _) = relay.expect_forward(ForwardKind::Offer).await;
    assert_eq!(target, remote);

    let reason = wait_for(&mut client, |e| match e {
        ClientEvent::PeerDisconnected { peer_id, reason } if *peer_id == remote => {
            Some(reason.clone())
        }
        _ => None,
    })
    .await;
    assert_eq!(reason, CloseReason::NegotiationTimeout);

    // A fresh attempt is allowed once the stalled session is gone.
    client.connect_to(remote).await.unwrap();
    relay.expect_forward(ForwardKind::Offer).await;

    client.shutdown().await;
}

#[tokio::test]
async fn test_early_candidates_are_parked_then_applied_in_order() {
    init_tracing();
    let network = FakeNetwork::new();
    let (local, remote) = (PeerId::new(), PeerId::new());
    let (mut client, mut relay) = ScriptedRelay::start(&network, local);
    wait_for(&mut client, |e| matches!(e, ClientEvent::Welcome { .. }).then_some(())).await;

    // Candidates overtake the offer they belong to.
    relay.forward_from(remote, ForwardKind::Candidate, &candidate("a"));
    relay.forward_from(remote, ForwardKind::Candidate, &candidate("b"));

    let (initiator, _initiator_events) = remote_transport(&network, local).await;
    let offer = initiator.create_offer().await.unwrap();
    relay.forward_from(remote, ForwardKind::Offer, &offer);

    let (target, answer) = relay.expect_forward(ForwardKind::Answer).await;
    assert_eq!(target, remote);
    let answer: SessionDescription = serde_json::from_value(answer).unwrap();

    // Parked candidates are flushed before the answer goes out.
    let applied = network.candidates_from(remote).await;
    assert_eq!(applied, vec![candidate("a"), candidate("b")]);

    // Later candidates are applied directly.
    relay.forward_from(remote, ForwardKind::Candidate, &candidate("c"));
    let applied = wait_for_applied(&network, remote, 3).await;
    assert_eq!(applied[2], candidate("c"));

    initiator.apply_answer(answer).await.unwrap();
    wait_for(&mut client, |e| {
        matches!(e, ClientEvent::PeerConnected { peer_id } if *peer_id == remote).then_some(())
    })
    .await;

    client.shutdown().await;
}

#[tokio::test]
async fn test_local_candidates_are_forwarded() {
    init_tracing();
    let network = FakeNetwork::new();
    let (local, remote) = (PeerId::new(), PeerId::new());
    let (mut client, mut relay) = ScriptedRelay::start(&network, local);
    wait_for(&mut client, |e| matches!(e, ClientEvent::Welcome { .. }).then_some(())).await;

    client.connect_to(remote).await.unwrap();
    relay.expect_forward(ForwardKind::Offer).await;

    let (target, payload) = relay.expect_forward(ForwardKind::Candidate).await;
    assert_eq!(target, remote);
    let forwarded: IceCandidate = serde_json::from_value(payload).unwrap();
    assert!(forwarded.candidate.starts_with("candidate:offer"));

    client.shutdown().await;
}

#[tokio::test]
async fn test_glare_greater_id_yields() {
    init_tracing();
    let network = FakeNetwork::new();
    let (smaller, greater) = ordered_ids();
    let (mut client, mut relay) = ScriptedRelay::start(&network, greater);
    wait_for(&mut client, |e| matches!(e, ClientEvent::Welcome { .. }).then_some(())).await;

    client.connect_to(smaller).await.unwrap();
    relay.expect_forward(ForwardKind::Offer).await;

    // The other side offered at the same time.
    let (initiator, mut initiator_events) = remote_transport(&network, greater).await;
    let offer = initiator.create_offer().await.unwrap();
    relay.forward_from(smaller, ForwardKind::Offer, &offer);

    let (target, answer) = relay.expect_forward(ForwardKind::Answer).await;
    assert_eq!(target, smaller);
    initiator
        .apply_answer(serde_json::from_value(answer).unwrap())
        .await
        .unwrap();

    let events = collect_until(&mut client, |e| {
        matches!(e, ClientEvent::PeerConnected { peer_id } if *peer_id == smaller)
    })
    .await;
    assert!(
        events
            .iter()
            .all(|e| !matches!(e, ClientEvent::PeerDisconnected { .. })),
        "yielding is not a disconnect: {events:?}"
    );

    let opened = tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match initiator_events.recv().await.map(|e| e.event) {
                Some(TransportEvent::ChannelOpen(_)) => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(opened);

    client.shutdown().await;
}

#[tokio::test]
async fn test_glare_smaller_id_keeps_its_offer() {
    init_tracing();
    let network = FakeNetwork::new();
    let (smaller, greater) = ordered_ids();
    let (mut client, mut relay) = ScriptedRelay::start(&network, smaller);
    wait_for(&mut client, |e| matches!(e, ClientEvent::Welcome { .. }).then_some(())).await;

    client.connect_to(greater).await.unwrap();
    let (_, our_offer) = relay.expect_forward(ForwardKind::Offer).await;

    let (competing, _competing_events) = remote_transport(&network, smaller).await;
    let their_offer = competing.create_offer().await.unwrap();
    relay.forward_from(greater, ForwardKind::Offer, &their_offer);
    assert!(
        relay
            .sends_no(ForwardKind::Answer, Duration::from_millis(200))
            .await
    );

    // The remote yields and answers our offer instead.
    let (responder, _responder_events) = remote_transport(&network, smaller).await;
    let answer = responder
        .accept_offer(serde_json::from_value(our_offer).unwrap())
        .await
        .unwrap();
    relay.forward_from(greater, ForwardKind::Answer, &answer);

    wait_for(&mut client, |e| {
        matches!(e, ClientEvent::PeerConnected { peer_id } if *peer_id == greater).then_some(())
    })
    .await;

    client.shutdown().await;
}

#[tokio::test]
async fn test_malformed_forward_is_ignored() {
    init_tracing();
    let network = FakeNetwork::new();
    let (local, remote) = (PeerId::new(), PeerId::new());
    let (mut client, mut relay) = ScriptedRelay::start(&network, local);
    wait_for(&mut client, |e| matches!(e, ClientEvent::Welcome { .. }).then_some(())).await;

    relay.forward_from(remote, ForwardKind::Offer, &serde_json::json!({"nonsense": true}));
    assert!(
        relay
            .sends_no(ForwardKind::Answer, Duration::from_millis(200))
            .await
    );

    // The orchestrator is still serving commands.
    client.connect_to(remote).await.unwrap();
    relay.expect_forward(ForwardKind::Offer).await;

    client.shutdown().await;
}
