use crate::error::ConfigError;
use dropline_core::IceServerConfig;
use std::net::SocketAddr;
use std::str::FromStr;

const DEFAULT_BIND: ([u8; 4], u16) = ([0, 0, 0, 0], 3000);
const DEFAULT_STUN: &str = "stun:stun.l.google.com:19302";

/// Which room codes a client may join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomPolicy {
    /// Any code is accepted; the room is created on first join.
    #[default]
    Open,
    /// Only codes handed out by `POST /rooms` exist.
    Registered,
}

impl FromStr for RoomPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "registered" => Ok(Self::Registered),
            other => Err(ConfigError::UnknownRoomPolicy(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub ice_servers: Vec<IceServerConfig>,
    pub room_policy: RoomPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(DEFAULT_BIND),
            ice_servers: vec![IceServerConfig {
                urls: vec![DEFAULT_STUN.to_owned()],
                username: None,
                credential: None,
            }],
            room_policy: RoomPolicy::Open,
        }
    }
}

impl ServerConfig {
    /// Reads `DROPLINE_BIND`, `DROPLINE_ROOM_POLICY`, `TURN_URL`, `TURN_USERNAME`
    /// and `TURN_CREDENTIAL`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("DROPLINE_BIND") {
            config.bind = value
                .parse()
                .map_err(|source| ConfigError::InvalidBind { value, source })?;
        }

        if let Some(value) = lookup("DROPLINE_ROOM_POLICY") {
            config.room_policy = value.parse()?;
        }

        if let Some(turn_url) = lookup("TURN_URL") {
            config.ice_servers.push(IceServerConfig {
                urls: vec![turn_url],
                username: lookup("TURN_USERNAME"),
                credential: lookup("TURN_CREDENTIAL"),
            });
        }

        Ok(config)
    }
}
