use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::Level;

use dropline_client::fake::FakeNetwork;
use dropline_client::{Client, ClientConfig, ClientEvent, TransferConfig};
use dropline_core::PeerId;
use dropline_server::{ServerConfig, serve_on};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Starts a relay on an ephemeral port and returns its http endpoint.
pub async fn spawn_relay() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    let config = ServerConfig {
        bind: addr,
        ..ServerConfig::default()
    };

    tokio::spawn(async move {
        serve_on(listener, config).await.expect("Test relay failed");
    });

    format!("http://{addr}")
}

/// Small chunks and a short timeout so tests exercise the paths quickly.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        negotiation_timeout: Duration::from_millis(500),
        sweep_interval: Duration::from_millis(50),
        transfer: TransferConfig {
            chunk_size: 1024,
            high_watermark: 8 * 1024,
            progress_step: 4 * 1024,
        },
        ..ClientConfig::default()
    }
}

/// Connects a client over the fake network and waits for its relay identity.
pub async fn connect_client(endpoint: &str, network: &Arc<FakeNetwork>) -> (Client, PeerId) {
    let mut client = Client::connect(endpoint, test_config(), Arc::new(network.factory()))
        .await
        .expect("Client failed to connect");
    let id = wait_for(&mut client, |e| match e {
        ClientEvent::Welcome { peer_id } => Some(*peer_id),
        _ => None,
    })
    .await;
    (client, id)
}

/// Skips events until `pick` accepts one.
pub async fn wait_for<T>(
    client: &mut Client,
    mut pick: impl FnMut(&ClientEvent) -> Option<T>,
) -> T {
    timeout(EVENT_TIMEOUT, async {
        loop {
            let event = client
                .next_event()
                .await
                .expect("Client stopped before the expected event");
            if let Some(found) = pick(&event) {
                return found;
            }
        }
    })
    .await
    .expect("Timed out waiting for client event")
}

/// Collects events until `stop` matches one, returning everything seen including it.
pub async fn collect_until(
    client: &mut Client,
    mut stop: impl FnMut(&ClientEvent) -> bool,
) -> Vec<ClientEvent> {
    let mut seen = Vec::new();
    timeout(EVENT_TIMEOUT, async {
        loop {
            let event = client
                .next_event()
                .await
                .expect("Client stopped before the expected event");
            let done = stop(&event);
            seen.push(event);
            if done {
                return;
            }
        }
    })
    .await
    .expect("Timed out collecting client events");
    seen
}
