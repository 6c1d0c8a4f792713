use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

const MAX_ROOM_CODE_CHARS: usize = 64;
const GENERATED_CODE_LEN: usize = 6;

/// Opaque room identifier, either chosen by a user or generated by the room directory.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomCodeError {
    #[error("room code is empty")]
    Empty,
    #[error("room code is longer than 64 characters")]
    TooLong,
    #[error("room code contains control characters")]
    ControlCharacter,
}

impl RoomCode {
    pub fn parse(raw: &str) -> Result<Self, RoomCodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RoomCodeError::Empty);
        }
        if trimmed.chars().count() > MAX_ROOM_CODE_CHARS {
            return Err(RoomCodeError::TooLong);
        }
        if trimmed.chars().any(char::is_control) {
            return Err(RoomCodeError::ControlCharacter);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Short lowercase code for server created rooms.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..GENERATED_CODE_LEN].to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
