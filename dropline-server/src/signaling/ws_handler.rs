use crate::app::AppState;
use crate::error::RelayError;
use crate::relay::RelayCommand;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use dropline_core::{ClientMessage, PeerId, RoomCode, ServerMessage, display_name};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = PeerId::new();
    info!("New WebSocket connection: {:?}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.signaling.add_peer(peer_id, tx);
    state
        .signaling
        .send_signal(peer_id, &ServerMessage::Welcome { peer_id });
    state.signaling.send_signal(
        peer_id,
        &ServerMessage::IceConfig {
            ice_servers: state.signaling.get_ice_servers(),
        },
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            if let Err(e) = handle_client_message(&state, peer_id, client_msg).await
                            {
                                error!("Relay died: {}", e);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Invalid ClientMessage from {:?}: {:?}", peer_id, e);
                            state.signaling.send_signal(
                                peer_id,
                                &ServerMessage::Error {
                                    message: format!("malformed message: {e}"),
                                },
                            );
                        }
                    },
                    Message::Binary(_) => {
                        warn!("Ignoring binary frame from {:?}", peer_id);
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    if state
        .relay_tx
        .send(RelayCommand::Leave { peer_id })
        .await
        .is_err()
    {
        error!("Relay died before {:?} could leave", peer_id);
    }
    state.signaling.remove_peer(&peer_id);
    info!("WebSocket disconnected: {:?}", peer_id);
}

/// Errors only when the relay actor is gone; everything else is answered in-band.
async fn handle_client_message(
    state: &AppState,
    peer_id: PeerId,
    msg: ClientMessage,
) -> Result<(), RelayError> {
    let cmd = match msg {
        ClientMessage::Join { room, name } => {
            let code = match admit(state, &room).await {
                Ok(code) => code,
                Err(e) => {
                    info!("Rejected join of {:?} to '{}': {}", peer_id, room, e);
                    state.signaling.send_signal(
                        peer_id,
                        &ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                    return Ok(());
                }
            };
            RelayCommand::Join {
                peer_id,
                room: code,
                name: display_name(name.as_deref()),
            }
        }

        ClientMessage::Forward {
            target_id,
            kind,
            payload,
        } => {
            debug!("{:?} forwards {:?} to {:?}", peer_id, kind, target_id);
            RelayCommand::Forward {
                sender_id: peer_id,
                target_id,
                kind,
                payload,
            }
        }

        ClientMessage::Presence => RelayCommand::Presence { peer_id },
    };

    state
        .relay_tx
        .send(cmd)
        .await
        .map_err(|_| RelayError::RelayClosed)
}

async fn admit(state: &AppState, room: &str) -> Result<RoomCode, RelayError> {
    let code = RoomCode::parse(room)?;
    if state.directory.lookup_room_record(&code).await? {
        Ok(code)
    } else {
        Err(RelayError::RoomNotFound(code))
    }
}
