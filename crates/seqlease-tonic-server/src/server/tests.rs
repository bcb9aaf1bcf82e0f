use super::{
    config::{CliArgs, ServerConfig, StoreConfig},
    service::handler::{LeaseService, SharedAllocator},
};
use clap::Parser;
use core::time::Duration;
use seqlease::{Allocator, AllocatorConfig, CounterStore, MemoryStore};
use seqlease_tonic_core::proto::{
    AllocEntitySeqRequest, AllocGlobalIdRequest, seq_lease_server::SeqLease,
};
use std::sync::Arc;
use tonic::{Code, Request};

fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
    let argv = std::iter::once("seqlease-tonic-server").chain(args.iter().copied());
    ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
}

fn service(config: &ServerConfig) -> LeaseService {
    let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
    let allocator: SharedAllocator =
        Arc::new(Allocator::new(store, config.allocator.clone()).unwrap());
    LeaseService::new(allocator, config)
}

fn test_config() -> ServerConfig {
    let mut config = parse(&["--in-memory", "--max-batch-count", "100"]).unwrap();
    config.shutdown_timeout = Duration::from_millis(300);
    config
}

#[test]
fn defaults_use_sqlite_store() {
    let config = parse(&[]).unwrap();
    assert!(matches!(config.store, StoreConfig::Sqlite { .. }));
    assert_eq!(config.allocator, AllocatorConfig::default());
    assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    assert_eq!(config.server_addr.port(), 50051);
}

#[test]
fn in_memory_flag_selects_memory_store() {
    let config = parse(&["--in-memory", "--batch-size", "50"]).unwrap();
    assert_eq!(config.store, StoreConfig::Memory);
    assert_eq!(config.allocator.batch_size, 50);
}

#[test]
fn invalid_settings_are_rejected() {
    assert!(parse(&["--batch-size", "0"]).is_err());
    assert!(parse(&["--shard-width", "0"]).is_err());
    assert!(parse(&["--max-attempts", "1"]).is_err());
    assert!(parse(&["--max-batch-count", "0"]).is_err());
    assert!(parse(&["--busy-timeout-ms", "0"]).is_err());
    assert!(parse(&["--in-memory", "--busy-timeout-ms", "0"]).is_ok());
    assert!(parse(&["--server-addr", "/tmp/seqlease.sock"]).is_err());
}

#[tokio::test]
async fn global_ids_start_at_the_seed() {
    let service = service(&test_config());

    for expected in 0..3 {
        let resp = service
            .alloc_global_id(Request::new(AllocGlobalIdRequest {
                counter_class: "room".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(resp.into_inner().id, expected);
    }
}

#[tokio::test]
async fn unknown_counter_class_is_invalid() {
    let service = service(&test_config());

    let status = service
        .alloc_global_id(Request::new(AllocGlobalIdRequest {
            counter_class: "lobby".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn entity_batches_are_contiguous() {
    let service = service(&test_config());
    let alloc = |count| {
        service.alloc_entity_seq(Request::new(AllocEntitySeqRequest {
            entity_key: 7,
            count,
        }))
    };

    let first = alloc(10).await.unwrap().into_inner();
    assert_eq!((first.first, first.count), (1, 10));

    // Zero means one.
    let next = alloc(0).await.unwrap().into_inner();
    assert_eq!((next.first, next.count), (11, 1));

    let status = alloc(101).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(service.inflight(), 0);
}

#[tokio::test]
async fn requests_are_refused_after_shutdown() {
    let service = service(&test_config());

    service.shutdown().await.unwrap();

    let status = service
        .alloc_entity_seq(Request::new(AllocEntitySeqRequest {
            entity_key: 1,
            count: 1,
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
    assert_eq!(service.inflight(), 0);
}

#[tokio::test]
async fn shutdown_waits_for_inflight_requests() {
    let service = service(&test_config());

    let guard = service.admit().unwrap();
    let draining = tokio::spawn({
        let service = service.clone();
        async move { service.shutdown().await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!draining.is_finished());
    drop(guard);

    assert!(draining.await.unwrap().is_ok());
}

#[tokio::test]
async fn shutdown_gives_up_after_timeout() {
    let service = service(&test_config());

    let _guard = service.admit().unwrap();
    assert!(service.shutdown().await.is_err());
    assert_eq!(service.inflight(), 1);
}

#[tokio::test]
async fn cancelled_request_stays_inflight_until_its_work_finishes() {
    let service = service(&test_config());
    let (release, blocked) = std::sync::mpsc::channel::<()>();

    let guard = service.admit().unwrap();
    let call = service.run_blocking(guard, move |allocator| {
        let _ = blocked.recv();
        allocator.next_for_entity(1)
    });
    // The caller gives up while the allocation is still running.
    assert!(
        tokio::time::timeout(Duration::from_millis(20), call)
            .await
            .is_err()
    );

    assert_eq!(service.inflight(), 1);
    assert!(service.shutdown().await.is_err());

    release.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.inflight() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
