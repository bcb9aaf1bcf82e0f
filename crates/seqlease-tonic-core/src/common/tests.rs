use crate::{
    ClientError, Error, LeaseClient, is_broken_transport,
    proto::{
        AllocEntitySeqRequest, AllocEntitySeqResponse, AllocGlobalIdRequest,
        AllocGlobalIdResponse,
        seq_lease_server::{SeqLease, SeqLeaseServer},
    },
};
use seqlease::{Allocator, AllocatorConfig, CounterClass, MemoryStore, PoolConfig, StoreError};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Code, Request, Response, Status, transport::Server};

// Counter class the test service always fails with `UNAVAILABLE`.
const FLAKY_CLASS: CounterClass = CounterClass::new(13);
const MAX_COUNT: u32 = 1000;

struct TestService {
    allocator: Allocator<MemoryStore>,
}

#[tonic::async_trait]
impl SeqLease for TestService {
    async fn alloc_global_id(
        &self,
        req: Request<AllocGlobalIdRequest>,
    ) -> Result<Response<AllocGlobalIdResponse>, Status> {
        let class = req
            .into_inner()
            .counter_class
            .parse::<CounterClass>()
            .map_err(Error::from)?;
        if class == FLAKY_CLASS {
            return Err(Status::unavailable("store is down"));
        }
        let id = self.allocator.next_global(class).map_err(Error::from)?;
        Ok(Response::new(AllocGlobalIdResponse { id }))
    }

    async fn alloc_entity_seq(
        &self,
        req: Request<AllocEntitySeqRequest>,
    ) -> Result<Response<AllocEntitySeqResponse>, Status> {
        let req = req.into_inner();
        let count = req.count.max(1);
        if count > MAX_COUNT {
            return Err(Error::InvalidRequest {
                reason: format!("count {count} exceeds {MAX_COUNT}"),
            }
            .into());
        }
        let first = self
            .allocator
            .next_batch_for_entity(req.entity_key, u64::from(count))
            .map_err(Error::from)?;
        Ok(Response::new(AllocEntitySeqResponse { first, count }))
    }
}

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = TestService {
        allocator: Allocator::new(Arc::new(MemoryStore::new()), AllocatorConfig::default())
            .unwrap(),
    };

    tokio::spawn(
        Server::builder()
            .add_service(SeqLeaseServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    addr
}

fn client(addr: SocketAddr, config: PoolConfig) -> LeaseClient {
    LeaseClient::connect(format!("http://{addr}"), config).unwrap()
}

#[test]
fn allocation_errors_map_to_status_codes() {
    let cases = [
        (
            seqlease::Error::InvalidRequest {
                reason: "bad".to_string(),
            },
            Code::InvalidArgument,
        ),
        (
            seqlease::Error::ShardNotFound { shard_id: 3 },
            Code::InvalidArgument,
        ),
        (
            seqlease::Error::PoolExhausted { max_active: 2 },
            Code::ResourceExhausted,
        ),
        (
            seqlease::Error::SequenceOverflow { entity_key: 1 },
            Code::ResourceExhausted,
        ),
        (
            seqlease::Error::Store(StoreError::Busy {
                reason: "locked".to_string(),
            }),
            Code::Unavailable,
        ),
        (
            seqlease::Error::RetriesExhausted {
                operation: "lease",
                key: 0,
                attempts: 3,
            },
            Code::Internal,
        ),
        (seqlease::Error::PoolClosed, Code::Internal),
    ];

    for (err, code) in cases {
        let status = Status::from(Error::from(err));
        assert_eq!(status.code(), code, "{}", status.message());
    }
}

#[test]
fn service_errors_map_to_status_codes() {
    let cases = [
        (Error::ServiceShutdown, Code::Unavailable),
        (Error::RequestCancelled, Code::Cancelled),
        (
            Error::InvalidRequest {
                reason: "count too large".to_string(),
            },
            Code::InvalidArgument,
        ),
        (
            Error::TaskFailed {
                context: "panicked".to_string(),
            },
            Code::Internal,
        ),
    ];

    for (err, code) in cases {
        assert_eq!(Status::from(err).code(), code);
    }
}

#[test]
fn only_transport_failures_discard_the_stub() {
    assert!(is_broken_transport(Code::Unavailable));
    assert!(is_broken_transport(Code::Unknown));
    assert!(is_broken_transport(Code::Cancelled));
    assert!(!is_broken_transport(Code::InvalidArgument));
    assert!(!is_broken_transport(Code::ResourceExhausted));
    assert!(!is_broken_transport(Code::Internal));
}

#[test]
fn malformed_endpoint_is_rejected() {
    let err = LeaseClient::connect("not a uri", PoolConfig::default()).err();
    assert!(matches!(err, Some(ClientError::Endpoint(_))));
}

#[tokio::test]
async fn client_allocates_through_one_pooled_stub() {
    let addr = spawn_server().await;
    let client = client(addr, PoolConfig::default());

    assert_eq!(client.alloc_global_id(CounterClass::ROOM).await.unwrap(), 0);
    assert_eq!(client.alloc_global_id(CounterClass::ROOM).await.unwrap(), 1);
    assert_eq!(client.alloc_entity_seq(9, 10).await.unwrap(), (1, 10));
    assert_eq!(client.alloc_entity_seq(9, 0).await.unwrap(), (11, 1));

    assert_eq!(client.pool().active_count(), 1);
    assert_eq!(client.pool().idle_count(), 1);
}

#[tokio::test]
async fn rejected_request_keeps_the_stub() {
    let addr = spawn_server().await;
    let client = client(addr, PoolConfig::default());

    let err = client.alloc_entity_seq(0, MAX_COUNT + 1).await.unwrap_err();
    assert!(matches!(err, ClientError::Status(s) if s.code() == Code::InvalidArgument));
    assert_eq!(client.pool().active_count(), 1);
    assert_eq!(client.pool().idle_count(), 1);
}

#[tokio::test]
async fn unavailable_status_discards_the_stub() {
    let addr = spawn_server().await;
    let client = client(addr, PoolConfig::default());

    client.alloc_global_id(CounterClass::ROOM).await.unwrap();
    assert_eq!(client.pool().active_count(), 1);

    let err = client.alloc_global_id(FLAKY_CLASS).await.unwrap_err();
    assert!(matches!(err, ClientError::Status(s) if s.code() == Code::Unavailable));
    assert_eq!(client.pool().active_count(), 0);
}

#[tokio::test]
async fn exhausted_pool_fails_fast() {
    let addr = spawn_server().await;
    let client = client(addr, PoolConfig::default().with_max_active(1));

    let held = client.pool().get().unwrap();
    let err = client.alloc_global_id(CounterClass::ROOM).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Pool(seqlease::Error::PoolExhausted { max_active: 1 })
    ));

    client.pool().put(held, false).unwrap();
    assert!(client.alloc_global_id(CounterClass::ROOM).await.is_ok());
}

#[tokio::test]
async fn released_client_refuses_calls() {
    let addr = spawn_server().await;
    let client = client(addr, PoolConfig::default());

    client.alloc_global_id(CounterClass::SESSION).await.unwrap();
    client.release().unwrap();

    let err = client.alloc_global_id(CounterClass::SESSION).await.unwrap_err();
    assert!(matches!(err, ClientError::Pool(seqlease::Error::PoolClosed)));
    assert_eq!(client.pool().active_count(), 0);
}
