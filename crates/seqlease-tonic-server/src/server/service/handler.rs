//! gRPC service implementation for leased identifier allocation.
//!
//! [`LeaseService`] implements the [`SeqLease`] service on top of a shared
//! [`Allocator`]. Allocation may block on the durable store, so every call
//! runs on Tokio's blocking pool while the handler awaits it.
//!
//! ## Responsibilities
//!
//! - Validate `AllocGlobalId` and `AllocEntitySeq` requests.
//! - Hand allocation work to [`tokio::task::spawn_blocking`].
//! - Map allocation failures onto gRPC status codes.
//! - Track in-flight requests so shutdown can drain them.

use crate::server::{
    config::ServerConfig,
    telemetry::{
        decrement_requests_inflight, increment_ids_allocated, increment_request_errors,
        increment_requests, increment_requests_inflight, record_alloc_duration,
    },
};
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use seqlease::{Allocator, CounterClass, CounterStore};
use seqlease_tonic_core::{
    Error,
    proto::{
        AllocEntitySeqRequest, AllocEntitySeqResponse, AllocGlobalIdRequest,
        AllocGlobalIdResponse, seq_lease_server::SeqLease,
    },
};
use std::{sync::Arc, time::Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

/// The allocator every request handler shares.
pub type SharedAllocator = Arc<Allocator<dyn CounterStore>>;

/// gRPC front for an [`Allocator`].
///
/// Cloning is cheap; clones share the allocator, the in-flight count and
/// the shutdown state.
#[derive(Clone)]
pub struct LeaseService {
    allocator: SharedAllocator,
    max_batch_count: u32,
    shutdown_timeout: Duration,
    inflight: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
}

impl LeaseService {
    pub fn new(allocator: SharedAllocator, config: &ServerConfig) -> Self {
        Self {
            allocator,
            max_batch_count: config.max_batch_count,
            shutdown_timeout: config.shutdown_timeout,
            inflight: Arc::new(AtomicUsize::new(0)),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Number of requests currently being served.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    /// Stops admitting requests and waits, up to the configured shutdown
    /// timeout, for in-flight requests to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskFailed`] if requests are still running when the
    /// timeout expires.
    pub async fn shutdown(&self) -> Result<(), Error> {
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests");
        self.shutdown_token.cancel();

        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight requests ({} active)", self.inflight());
        let drained = timeout(self.shutdown_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight requests drained");
                Ok(())
            }
            Err(_) => Err(Error::TaskFailed {
                context: format!(
                    "{} requests still in flight after {:?}",
                    self.inflight(),
                    self.shutdown_timeout
                ),
            }),
        }
    }

    /// Registers a request, or refuses it once shutdown has begun.
    pub(crate) fn admit(&self) -> Result<InflightGuard, Error> {
        // Count first so a concurrent shutdown either sees this request or
        // the request sees the cancellation.
        let guard = InflightGuard::new(Arc::clone(&self.inflight));
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        Ok(guard)
    }

    /// Runs `op` on the blocking pool.
    ///
    /// The guard moves into the blocking task, so the request stays counted
    /// until `op` returns even if the awaiting future is dropped first.
    pub(crate) async fn run_blocking<T, F>(&self, guard: InflightGuard, op: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Allocator<dyn CounterStore>) -> seqlease::Result<T> + Send + 'static,
    {
        let allocator = Arc::clone(&self.allocator);
        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op(allocator.as_ref())
        })
        .await
        .map_err(|e| Error::TaskFailed {
            context: e.to_string(),
        })?;
        Ok(result?)
    }

    async fn global_id(&self, req: AllocGlobalIdRequest) -> Result<u64, Error> {
        let guard = self.admit()?;
        let class: CounterClass = req.counter_class.parse()?;

        increment_requests("alloc_global_id");
        self.run_blocking(guard, move |allocator| allocator.next_global(class))
            .await
    }

    async fn entity_seq(&self, req: AllocEntitySeqRequest) -> Result<(u64, u32), Error> {
        let guard = self.admit()?;
        let count = req.count.max(1);
        if count > self.max_batch_count {
            return Err(Error::InvalidRequest {
                reason: format!(
                    "Count {} exceeds maximum allowed ({})",
                    count, self.max_batch_count
                ),
            });
        }

        increment_requests("alloc_entity_seq");
        let entity_key = req.entity_key;
        let first = self
            .run_blocking(guard, move |allocator| {
                allocator.next_batch_for_entity(entity_key, u64::from(count))
            })
            .await?;
        Ok((first, count))
    }
}

/// Counts a request as in flight for as long as it is alive.
pub(crate) struct InflightGuard(Arc<AtomicUsize>);

impl InflightGuard {
    fn new(inflight: Arc<AtomicUsize>) -> Self {
        inflight.fetch_add(1, Ordering::SeqCst);
        increment_requests_inflight();
        Self(inflight)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
        decrement_requests_inflight();
    }
}

fn report<T>(method: &'static str, start: Instant, result: Result<T, Error>) -> Result<T, Status> {
    match result {
        Ok(value) => {
            record_alloc_duration(method, start.elapsed().as_secs_f64() * 1000.0);
            Ok(value)
        }
        Err(e) => {
            increment_request_errors(method);
            #[cfg(feature = "tracing")]
            tracing::warn!("{} failed: {}", method, e);
            Err(e.into())
        }
    }
}

#[tonic::async_trait]
impl SeqLease for LeaseService {
    /// Hands out the next value of a global counter.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(counter_class = %req.get_ref().counter_class)))]
    async fn alloc_global_id(
        &self,
        req: Request<AllocGlobalIdRequest>,
    ) -> Result<Response<AllocGlobalIdResponse>, Status> {
        let start = Instant::now();
        let id = report(
            "alloc_global_id",
            start,
            self.global_id(req.into_inner()).await,
        )?;

        increment_ids_allocated(1);
        Ok(Response::new(AllocGlobalIdResponse { id }))
    }

    /// Reserves consecutive sequence numbers for one entity. A zero count
    /// reserves one number.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(entity_key = req.get_ref().entity_key, count = req.get_ref().count)))]
    async fn alloc_entity_seq(
        &self,
        req: Request<AllocEntitySeqRequest>,
    ) -> Result<Response<AllocEntitySeqResponse>, Status> {
        let start = Instant::now();
        let (first, count) = report(
            "alloc_entity_seq",
            start,
            self.entity_seq(req.into_inner()).await,
        )?;

        increment_ids_allocated(u64::from(count));
        Ok(Response::new(AllocEntitySeqResponse { first, count }))
    }
}
