use crate::config::ServerConfig;
use crate::directory::{RoomDirectory, directory_for};
use crate::http::{create_room, lookup_room};
use crate::relay::{Relay, RelayCommand};
use crate::signaling::{SignalingService, ws_handler};
use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub struct AppState {
    pub signaling: SignalingService,
    pub relay_tx: mpsc::Sender<RelayCommand>,
    pub directory: Arc<dyn RoomDirectory>,
}

impl AppState {
    /// Spawns the relay actor; must be called inside a tokio runtime.
    pub fn new(config: &ServerConfig) -> Arc<Self> {
        Self::with_directory(config, directory_for(config.room_policy))
    }

    pub fn with_directory(config: &ServerConfig, directory: Arc<dyn RoomDirectory>) -> Arc<Self> {
        let signaling = SignalingService::new(config.ice_servers.clone());
        let relay_tx = Relay::spawn(Arc::new(signaling.clone()));

        Arc::new(Self {
            signaling,
            relay_tx,
            directory,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/rooms", post(create_room))
        .route("/rooms/{code}", get(lookup_room))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    serve_on(listener, config).await
}

pub async fn serve_on(listener: TcpListener, config: ServerConfig) -> Result<()> {
    let state = AppState::new(&config);
    let addr = listener.local_addr()?;
    info!(
        "Signaling relay listening on http://{} ({:?} rooms)",
        addr, config.room_policy
    );

    axum::serve(listener, router(state))
        .await
        .context("Relay server stopped")
}
