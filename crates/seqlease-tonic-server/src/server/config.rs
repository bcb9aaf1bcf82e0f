use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use seqlease::{
    AllocatorConfig, CounterStore, DEFAULT_BATCH_SIZE, DEFAULT_COUNTER_SEED, DEFAULT_LEASE_SEED,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_SECTION_BUCKETS, DEFAULT_SESSION_BUCKETS, DEFAULT_SHARD_WIDTH,
    MemoryStore, SqliteStore,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

/// Runtime configuration for the `seqlease-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first). Defaults suit a single-node deployment
/// backed by a local SQLite file.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "seqlease-tonic-server",
    version,
    about = "A gRPC service for leased per-entity sequence numbers"
)]
pub struct CliArgs {
    /// TCP address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:50051")]
    pub server_addr: SocketAddr,

    /// Path of the SQLite database holding the lease and counter rows.
    ///
    /// Created on first start. Ignored with `--in-memory`.
    ///
    /// Environment variable: `DATABASE_PATH`
    #[arg(long, env = "DATABASE_PATH", default_value = "seqlease.db")]
    pub database_path: PathBuf,

    /// Keep all rows in process memory. Nothing survives a restart, so only
    /// use this for tests and demos.
    ///
    /// Environment variable: `IN_MEMORY`
    #[arg(long, env = "IN_MEMORY", default_value_t = false)]
    pub in_memory: bool,

    /// How long a store call waits for a competing writer, in milliseconds.
    ///
    /// Environment variable: `BUSY_TIMEOUT_MS`
    #[arg(long, env = "BUSY_TIMEOUT_MS", default_value_t = 5_000)]
    pub busy_timeout_ms: u64,

    /// Number of entity keys sharing one lease row.
    ///
    /// Every entity in `[n * SHARD_WIDTH, (n + 1) * SHARD_WIDTH)` draws from
    /// the lease of shard `n`. Keep it fixed for the lifetime of a database,
    /// since changing it moves entities onto other lease rows.
    ///
    /// Environment variable: `SHARD_WIDTH`
    #[arg(long, env = "SHARD_WIDTH", default_value_t = DEFAULT_SHARD_WIDTH)]
    pub shard_width: u64,

    /// Numbers reserved from the store per lease extension.
    ///
    /// Environment variable: `BATCH_SIZE`
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u64,

    /// Bucket count of the shard-range table.
    ///
    /// Environment variable: `SECTION_BUCKETS`
    #[arg(long, env = "SECTION_BUCKETS", default_value_t = DEFAULT_SECTION_BUCKETS)]
    pub section_buckets: usize,

    /// Bucket count of the entity-cursor table.
    ///
    /// Environment variable: `SESSION_BUCKETS`
    #[arg(long, env = "SESSION_BUCKETS", default_value_t = DEFAULT_SESSION_BUCKETS)]
    pub session_buckets: usize,

    /// Value a new lease row starts at.
    ///
    /// Environment variable: `LEASE_SEED`
    #[arg(long, env = "LEASE_SEED", default_value_t = DEFAULT_LEASE_SEED)]
    pub lease_seed: u64,

    /// Value a new global counter row starts at.
    ///
    /// Environment variable: `COUNTER_SEED`
    #[arg(long, env = "COUNTER_SEED", default_value_t = DEFAULT_COUNTER_SEED)]
    pub counter_seed: u64,

    /// Store reads per allocation before a missing row is reported.
    ///
    /// Environment variable: `MAX_ATTEMPTS`
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: usize,

    /// Largest `count` accepted by `AllocEntitySeq`.
    ///
    /// Environment variable: `MAX_BATCH_COUNT`
    #[arg(long, env = "MAX_BATCH_COUNT", default_value_t = 10_000)]
    pub max_batch_count: u32,

    /// Seconds to wait for in-flight requests during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

/// Where lease and counter rows are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Sqlite { path: PathBuf, busy_timeout: Duration },
}

impl StoreConfig {
    /// Opens the configured store.
    pub fn open(&self) -> anyhow::Result<Arc<dyn CounterStore>> {
        let store: Arc<dyn CounterStore> = match self {
            Self::Memory => Arc::new(MemoryStore::new()),
            Self::Sqlite { path, busy_timeout } => Arc::new(
                SqliteStore::open(path, *busy_timeout)
                    .with_context(|| format!("failed to open database {}", path.display()))?,
            ),
        };
        Ok(store)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: SocketAddr,
    pub store: StoreConfig,
    pub allocator: AllocatorConfig,
    pub max_batch_count: u32,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_batch_count == 0 {
            bail!("MAX_BATCH_COUNT must be greater than 0");
        }

        if args.busy_timeout_ms == 0 && !args.in_memory {
            bail!("BUSY_TIMEOUT_MS must be greater than 0");
        }

        let allocator = AllocatorConfig::default()
            .with_shard_width(args.shard_width)
            .with_batch_size(args.batch_size)
            .with_section_buckets(args.section_buckets)
            .with_session_buckets(args.session_buckets)
            .with_lease_seed(args.lease_seed)
            .with_counter_seed(args.counter_seed)
            .with_max_attempts(args.max_attempts);
        allocator
            .validate()
            .context("invalid allocator configuration")?;

        let store = if args.in_memory {
            StoreConfig::Memory
        } else {
            StoreConfig::Sqlite {
                path: args.database_path,
                busy_timeout: Duration::from_millis(args.busy_timeout_ms),
            }
        };

        Ok(Self {
            server_addr: args.server_addr,
            store,
            allocator,
            max_batch_count: args.max_batch_count,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
