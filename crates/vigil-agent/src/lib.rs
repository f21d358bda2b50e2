//! vigil agent: polls host metrics into a local store and periodically
//! delivers the store's contents to the server over HTTP or gRPC.

pub mod config;
pub mod dispatch;
pub mod reporter;
pub mod runner;

pub use config::{AgentConfig, Transport};
pub use dispatch::{DispatchClient, DispatchError, Exchange};
pub use reporter::Reporter;
pub use runner::Agent;
