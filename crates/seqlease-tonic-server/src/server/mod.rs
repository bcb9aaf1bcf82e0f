//! Server internals of the `seqlease-tonic-server` binary.
//!
//! - [`config`] - CLI and environment configuration.
//! - [`service`] - The `SeqLease` gRPC service.
//! - [`telemetry`] - Logging, tracing and metrics setup.

pub mod config;
pub mod service;
pub mod telemetry;

#[cfg(test)]
mod tests;
