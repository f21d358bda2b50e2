//! vigil collector service: accepts metrics over HTTP and gRPC and keeps
//! the latest value of each in the configured storage backend.

pub mod api;
pub mod app;
pub mod config;
pub mod grpc;
pub mod logging;
pub mod middleware;
pub mod state;
