//! gRPC service implementation.
//!
//! - [`handler`] - gRPC service entry point (`LeaseService`).

pub mod handler;
