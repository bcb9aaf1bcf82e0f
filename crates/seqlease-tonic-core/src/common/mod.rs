//! Types shared by the `seqlease` gRPC server and its clients.
//!
//! - [`proto`] - Generated messages, client and server bindings.
//! - [`error`] - Service errors and their mapping onto gRPC status codes.
//! - [`client`] - A pooled client over [`seqlease::Pool`].

pub mod client;
pub mod error;

pub use client::*;
pub use error::*;

pub mod proto {
    tonic::include_proto!("seqlease");

    /// Encoded descriptor set for `tonic-reflection`.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("seqlease_descriptor");
}

#[cfg(test)]
mod tests;
