pub use dropline_core::model::{PeerId, RoomCode};

pub mod model {
    pub use dropline_core::model::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use dropline_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use dropline_client::*;
}
