use crate::error::ClientError;
use dropline_core::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

/// Typed view of a relay connection as the orchestrator sees it.
pub struct RelayLink {
    pub outgoing: mpsc::UnboundedSender<ClientMessage>,
    pub incoming: mpsc::UnboundedReceiver<ServerMessage>,
}

/// The relay's side of an in-memory [`RelayLink`].
pub struct RelayEnd {
    pub to_client: mpsc::UnboundedSender<ServerMessage>,
    pub from_client: mpsc::UnboundedReceiver<ClientMessage>,
}

impl RelayLink {
    pub fn pair() -> (RelayLink, RelayEnd) {
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let (to_client, incoming) = mpsc::unbounded_channel();
        (
            RelayLink { outgoing, incoming },
            RelayEnd {
                to_client,
                from_client,
            },
        )
    }

    /// Opens the relay websocket and pumps it through a reader and a writer task.
    pub async fn connect(endpoint: &str) -> Result<Self, ClientError> {
        let url = relay_url(endpoint)?;
        let (ws, _) = connect_async(url.as_str()).await?;
        info!("Connected to relay {}", url);

        let (mut write, mut read) = ws.split();
        let (link, relay) = RelayLink::pair();
        let RelayEnd {
            to_client,
            mut from_client,
        } = relay;

        tokio::spawn(async move {
            while let Some(msg) = from_client.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to serialize relay message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::text(text)).await {
                    warn!("Relay write failed: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
            debug!("Relay writer stopped");
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(msg) => {
                                if to_client.send(msg).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Discarding malformed relay message: {}", e),
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Relay read failed: {}", e);
                        break;
                    }
                }
            }
            info!("Relay connection closed");
        });

        Ok(link)
    }
}

/// Normalizes an http(s) or ws(s) endpoint into the relay's websocket URL.
pub fn relay_url(endpoint: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(endpoint)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(ClientError::UnsupportedScheme(other.to_owned())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::UnsupportedScheme(scheme.to_owned()))?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/ws");
    }
    Ok(url)
}
