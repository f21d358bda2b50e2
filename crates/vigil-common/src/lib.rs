//! Shared metric model for the vigil agent and server.
//!
//! [`types::Metric`] is the unit of telemetry exchanged between the two
//! sides. Its merge rule ([`types::merge`]) and integrity tag are defined
//! here once so every storage backend and transport applies them the same
//! way.

pub mod error;
pub mod types;

pub mod proto {
    #![allow(clippy::pedantic)]
    #![allow(clippy::missing_errors_doc)]
    #![allow(clippy::doc_markdown)]
    #![allow(clippy::default_trait_access)]
    tonic::include_proto!("vigil");
}

pub use error::MetricError;
pub use types::{merge, Metric, MetricKind};
