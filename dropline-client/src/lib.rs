mod client;
mod config;
mod error;
pub mod fake;
mod orchestrator;
mod relay_client;
mod session;
mod transfer;
mod transport;

pub use client::*;
pub use config::*;
pub use error::*;
pub use orchestrator::*;
pub use relay_client::*;
pub use session::*;
pub use transfer::*;
pub use transport::*;
