//! A pooled client for the lease service.
//!
//! [`LeaseClient`] keeps a [`seqlease::Pool`] of generated
//! [`SeqLeaseClient`] stubs. Every call checks a stub out, performs one RPC
//! and hands the stub back. Stubs whose call failed with a status that points
//! at a broken transport are closed rather than reused.

use crate::proto::{
    AllocEntitySeqRequest, AllocGlobalIdRequest, seq_lease_client::SeqLeaseClient,
};
use core::convert::Infallible;
use seqlease::{ConnectionManager, CounterClass, Pool, PoolConfig};
use tonic::{
    Code, Status,
    codec::CompressionEncoding,
    transport::{Channel, Endpoint},
};

/// Errors returned by [`LeaseClient`].
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// No connection could be checked out of, or returned to, the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] seqlease::Error),

    /// The server answered with an error status.
    #[error("RPC failed: {0}")]
    Status(#[from] Status),

    /// The endpoint address could not be parsed.
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] tonic::transport::Error),
}

/// Opens one lazily connected stub per pooled connection.
///
/// The underlying [`Channel`] dials on first use and reconnects on its own,
/// so `connect` never blocks and never fails. It must be called from within
/// a Tokio runtime.
#[derive(Clone, Debug)]
pub struct ChannelManager {
    endpoint: Endpoint,
}

impl ChannelManager {
    pub const fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl ConnectionManager for ChannelManager {
    type Connection = SeqLeaseClient<Channel>;
    type Error = Infallible;

    fn connect(&self) -> Result<Self::Connection, Infallible> {
        Ok(SeqLeaseClient::new(self.endpoint.connect_lazy())
            .accept_compressed(CompressionEncoding::Zstd))
    }

    fn disconnect(&self, conn: Self::Connection) -> Result<(), Infallible> {
        drop(conn);
        Ok(())
    }
}

/// Returns `true` for statuses after which a stub should not be reused.
pub const fn is_broken_transport(code: Code) -> bool {
    matches!(code, Code::Unavailable | Code::Unknown | Code::Cancelled)
}

/// Client for the `SeqLease` service backed by a connection pool.
///
/// # Example
/// ```no_run
/// use seqlease_tonic_core::{LeaseClient, seqlease::{CounterClass, PoolConfig}};
///
/// # async fn run() -> Result<(), seqlease_tonic_core::ClientError> {
/// let client = LeaseClient::connect("http://127.0.0.1:50051", PoolConfig::default())?;
/// let room = client.alloc_global_id(CounterClass::ROOM).await?;
/// let (first, count) = client.alloc_entity_seq(42, 10).await?;
/// # Ok(())
/// # }
/// ```
pub struct LeaseClient {
    pool: Pool<ChannelManager>,
}

impl LeaseClient {
    pub fn new(endpoint: Endpoint, config: PoolConfig) -> Self {
        Self {
            pool: Pool::new(ChannelManager::new(endpoint), config),
        }
    }

    /// Builds a client for `dst`, e.g. `"http://127.0.0.1:50051"`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Endpoint`] if `dst` is not a valid URI.
    pub fn connect(dst: impl Into<String>, config: PoolConfig) -> Result<Self, ClientError> {
        let endpoint = Endpoint::from_shared(dst.into())?;
        Ok(Self::new(endpoint, config))
    }

    pub const fn pool(&self) -> &Pool<ChannelManager> {
        &self.pool
    }

    /// Next value of the global counter `class`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Pool`] if no stub is available.
    /// - [`ClientError::Status`] if the server rejects the call.
    pub async fn alloc_global_id(&self, class: CounterClass) -> Result<u64, ClientError> {
        let mut checkout = Checkout::new(&self.pool)?;
        let result = checkout
            .stub()
            .alloc_global_id(AllocGlobalIdRequest {
                counter_class: class.to_string(),
            })
            .await;
        let response = checkout.finish(result)?;
        Ok(response.id)
    }

    /// Reserves `count` consecutive sequence numbers for `entity_key`.
    /// Returns the first number and how many were reserved.
    ///
    /// # Errors
    ///
    /// As [`alloc_global_id`](Self::alloc_global_id).
    pub async fn alloc_entity_seq(
        &self,
        entity_key: u64,
        count: u32,
    ) -> Result<(u64, u32), ClientError> {
        let mut checkout = Checkout::new(&self.pool)?;
        let result = checkout
            .stub()
            .alloc_entity_seq(AllocEntitySeqRequest { entity_key, count })
            .await;
        let response = checkout.finish(result)?;
        Ok((response.first, response.count))
    }

    /// Closes every idle stub and refuses further calls.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Pool`] if closing a stub fails.
    pub fn release(&self) -> Result<(), ClientError> {
        Ok(self.pool.release()?)
    }
}

// A checked-out stub. If the call future is dropped before `finish`, the stub
// is closed so the pool does not leak its slot.
struct Checkout<'a> {
    pool: &'a Pool<ChannelManager>,
    conn: Option<SeqLeaseClient<Channel>>,
}

impl<'a> Checkout<'a> {
    fn new(pool: &'a Pool<ChannelManager>) -> Result<Self, ClientError> {
        Ok(Self {
            pool,
            conn: Some(pool.get()?),
        })
    }

    fn stub(&mut self) -> &mut SeqLeaseClient<Channel> {
        self.conn.as_mut().expect("stub is held until finish")
    }

    fn finish<T>(mut self, result: Result<tonic::Response<T>, Status>) -> Result<T, ClientError> {
        let force_close = matches!(&result, Err(status) if is_broken_transport(status.code()));
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn, force_close)?;
        }
        Ok(result?.into_inner())
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = self.pool.put(conn, true);
        }
    }
}
