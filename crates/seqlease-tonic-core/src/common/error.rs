//! Error types for the lease service.
//!
//! [`Error`] captures every failure a request handler can report. It converts
//! into [`tonic::Status`] so handlers can propagate it with `?`:
//!
//! | Cause                                    | Status code          |
//! |------------------------------------------|----------------------|
//! | Malformed or out-of-bounds request       | `INVALID_ARGUMENT`   |
//! | Pool, lease or sequence exhaustion       | `RESOURCE_EXHAUSTED` |
//! | Transient store failure, shutting down   | `UNAVAILABLE`        |
//! | Client went away                         | `CANCELLED`          |
//! | Anything else                            | `INTERNAL`           |

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the lease service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The allocator rejected or failed the request.
    #[error(transparent)]
    Allocation(#[from] seqlease::Error),

    /// A blocking allocation task panicked or was aborted.
    #[error("Task failed: {context}")]
    TaskFailed { context: String },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The client request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// The gRPC status code this error is reported with.
    pub fn code(&self) -> Code {
        match self {
            Self::Allocation(e) if e.is_invalid_input() => Code::InvalidArgument,
            Self::Allocation(e) if e.is_exhausted() => Code::ResourceExhausted,
            Self::Allocation(e) if e.is_transient() => Code::Unavailable,
            Self::Allocation(_) | Self::TaskFailed { .. } => Code::Internal,
            Self::RequestCancelled => Code::Cancelled,
            Self::InvalidRequest { .. } => Code::InvalidArgument,
            Self::ServiceShutdown => Code::Unavailable,
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        Status::new(err.code(), err.to_string())
    }
}
