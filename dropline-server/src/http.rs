use crate::app::AppState;
use crate::error::RelayError;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dropline_core::RoomCode;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct CreatedRoom {
    pub code: RoomCode,
}

#[derive(Debug, Serialize)]
pub struct RoomLookup {
    pub code: RoomCode,
    pub exists: bool,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::InvalidRoomCode(_) => StatusCode::BAD_REQUEST,
            RelayError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            RelayError::RelayClosed => {
                error!("Relay request failed: {}", self);
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// `POST /rooms`
pub async fn create_room(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<CreatedRoom>), RelayError> {
    let code = state.directory.create_room_record().await?;
    Ok((StatusCode::CREATED, Json(CreatedRoom { code })))
}

/// `GET /rooms/{code}`
pub async fn lookup_room(
    Path(code): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<RoomLookup>, RelayError> {
    let code = RoomCode::parse(&code)?;
    let exists = state.directory.lookup_room_record(&code).await?;
    Ok(Json(RoomLookup { code, exists }))
}
