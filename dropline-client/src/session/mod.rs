mod connection_session;
mod negotiation_state;

pub use connection_session::*;
pub use negotiation_state::*;
