use crate::config::RoomPolicy;
use crate::error::RelayError;
use async_trait::async_trait;
use dashmap::DashMap;
use dropline_core::RoomCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Boundary to the room-naming service. The relay only asks whether a code exists
/// and, through the HTTP surface, asks it to mint new codes.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn create_room_record(&self) -> Result<RoomCode, RelayError>;

    async fn lookup_room_record(&self, code: &RoomCode) -> Result<bool, RelayError>;
}

/// Every code exists. Users pick room names freely.
#[derive(Debug, Default, Clone)]
pub struct OpenDirectory;

#[async_trait]
impl RoomDirectory for OpenDirectory {
    async fn create_room_record(&self) -> Result<RoomCode, RelayError> {
        Ok(RoomCode::generate())
    }

    async fn lookup_room_record(&self, _code: &RoomCode) -> Result<bool, RelayError> {
        Ok(true)
    }
}

/// Only codes created here exist.
#[derive(Debug, Default, Clone)]
pub struct RegisteredDirectory {
    records: Arc<DashMap<RoomCode, Instant>>,
}

impl RegisteredDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomDirectory for RegisteredDirectory {
    async fn create_room_record(&self) -> Result<RoomCode, RelayError> {
        loop {
            let code = RoomCode::generate();
            if self.records.contains_key(&code) {
                continue;
            }
            self.records.insert(code.clone(), Instant::now());
            info!("Registered room record '{}'", code);
            return Ok(code);
        }
    }

    async fn lookup_room_record(&self, code: &RoomCode) -> Result<bool, RelayError> {
        Ok(self.records.contains_key(code))
    }
}

pub fn directory_for(policy: RoomPolicy) -> Arc<dyn RoomDirectory> {
    match policy {
        RoomPolicy::Open => Arc::new(OpenDirectory),
        RoomPolicy::Registered => Arc::new(RegisteredDirectory::new()),
    }
}
