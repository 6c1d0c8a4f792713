pub mod harness;
pub mod scripted_relay;

pub use harness::*;
pub use scripted_relay::*;
pub use test_transports::*;
