#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use seqlease::Allocator;
use seqlease_tonic_core::proto::{FILE_DESCRIPTOR_SET, seq_lease_server::SeqLeaseServer};
use server::config::{CliArgs, ServerConfig};
use server::service::handler::{LeaseService, SharedAllocator};
use server::telemetry::{init_telemetry, observe_lease_extensions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type LeaseServer = SeqLeaseServer<LeaseService>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = ServerConfig::try_from(CliArgs::parse())?;
    let providers = init_telemetry()?;

    let allocator: SharedAllocator =
        Arc::new(Allocator::new(config.store.open()?, config.allocator.clone())?);
    observe_lease_extensions({
        let allocator = Arc::clone(&allocator);
        move || allocator.sections().extensions()
    });

    let listener = TcpListener::bind(config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;
    // Installed before serving so a missing handler fails startup.
    let signals = Signals::install()?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        addr = %config.server_addr,
        store = ?config.store,
        batch_size = config.allocator.batch_size,
        shard_width = config.allocator.shard_width,
        "Lease service listening"
    );

    let service = LeaseService::new(allocator, &config);
    let served = serve(listener, service, signals).await;
    providers.shutdown();
    served
}

async fn serve(listener: TcpListener, service: LeaseService, signals: Signals) -> anyhow::Result<()> {
    let (health, health_service) = tonic_health::server::health_reporter();
    health.set_serving::<LeaseServer>().await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let lease = SeqLeaseServer::new(service.clone())
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(ServiceBuilder::new().layer(cors).layer(GrpcWebLayer::new()))
        .add_service(health_service)
        .add_service(reflection)
        .add_service(lease)
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            drain(signals, service, health),
        )
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Lease service stopped");
    Ok(())
}

/// Resolves once the process is asked to stop and in-flight requests have
/// drained or timed out.
async fn drain(signals: Signals, service: LeaseService, health: HealthReporter) {
    let _signal = signals.recv().await;
    #[cfg(feature = "tracing")]
    tracing::info!(signal = _signal, "Shutting down");

    // Flip health first so balancers stop routing before requests are refused.
    health.set_not_serving::<LeaseServer>().await;

    if let Err(_e) = service.shutdown().await {
        #[cfg(feature = "tracing")]
        tracing::warn!("Shutdown did not drain cleanly: {}", _e);
    }
}

/// Termination signals the server stops on.
struct Signals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Signals {
    fn install() -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("failed to install SIGTERM handler")?,
        })
    }

    /// Waits for SIGTERM or Ctrl+C and names the one received.
    async fn recv(self) -> &'static str {
        #[cfg(unix)]
        let terminate = {
            let mut terminate = self.terminate;
            async move {
                terminate.recv().await;
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        // Without a Ctrl+C handler only SIGTERM can stop the server.
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            () = ctrl_c => "SIGINT",
            () = terminate => "SIGTERM",
        }
    }
}
