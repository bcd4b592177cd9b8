//! HTTP server command
//!
//! Startup order: migrations, database connection, cache client, listener.
//! Any failure before the listener binds is fatal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use userbase_server::cache::{CacheInitializer, RedisDialer};
use userbase_server::db::migrations::{self, MigrationOutcome};
use userbase_server::db::{
    ConnectionManager, Connector, FailurePolicy, HealthProbe, PgStore, PoolConfig, RetryPolicy,
};
use userbase_server::http::{run_server, shutdown_signal, AppState, ServerConfig};

/// What a failed runtime reconnect does
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnReconnectFailure {
    /// Terminate the process
    Exit,
    /// Answer 503 and retry on the next request
    Unavailable,
}

impl From<OnReconnectFailure> for FailurePolicy {
    fn from(value: OnReconnectFailure) -> Self {
        match value {
            OnReconnectFailure::Exit => FailurePolicy::Exit,
            OnReconnectFailure::Unavailable => FailurePolicy::Unavailable,
        }
    }
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(long, short = 'b', env = "USERBASE_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Cache address (host:port or redis:// URL)
    #[arg(long, env = "REDIS_ADDR")]
    pub redis_addr: String,

    /// Timeout for the one-shot cache connect
    #[arg(long, default_value = "5")]
    pub cache_timeout_secs: u64,

    /// Connect attempts before giving up
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub connect_attempts: u32,

    /// Fixed delay between connect attempts
    #[arg(long, default_value = "5")]
    pub connect_delay_secs: u64,

    /// How long a single connect attempt waits for the server
    #[arg(long, default_value = "10")]
    pub connect_timeout_secs: u64,

    /// Maximum open connections
    #[arg(long, default_value = "10")]
    pub max_open: u32,

    /// Connections kept warm while idle
    #[arg(long, default_value = "5")]
    pub max_idle: u32,

    /// Recycle connections older than this
    #[arg(long, default_value = "1800")]
    pub max_lifetime_secs: u64,

    /// Bound on each health probe
    #[arg(long, default_value = "2000")]
    pub probe_timeout_ms: u64,

    /// Per-request timeout
    #[arg(long, default_value = "30")]
    pub request_timeout_secs: u64,

    /// Grace period for in-flight requests on shutdown
    #[arg(long, default_value = "10")]
    pub shutdown_grace_secs: u64,

    /// Behavior when a runtime reconnect exhausts its attempts
    #[arg(long, value_enum, default_value = "exit")]
    pub on_reconnect_failure: OnReconnectFailure,

    /// Skip schema migrations at startup
    #[arg(long)]
    pub skip_migrations: bool,
}

/// Database connection string, shared by `serve` and `migrate`
#[derive(Args, Debug)]
pub struct DatabaseArgs {
    /// Database URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
}

impl ServeArgs {
    fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy::new(
            self.connect_attempts,
            Duration::from_secs(self.connect_delay_secs),
        )?)
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_open: self.max_open,
            max_idle: self.max_idle,
            max_lifetime: Duration::from_secs(self.max_lifetime_secs),
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }
}

/// Run schema migrations; anything but success or "nothing to do" is fatal.
pub async fn run_migrations(database: &DatabaseArgs) -> Result<()> {
    match migrations::run_url(&database.database_url)
        .await
        .context("Migration failed")?
    {
        MigrationOutcome::Applied(n) => tracing::info!(applied = n, "Migrations applied"),
        MigrationOutcome::NoChange => tracing::info!("No pending migrations"),
    }
    Ok(())
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    if !args.skip_migrations {
        run_migrations(&args.database).await?;
    }

    let store = PgStore::new(args.database.database_url.clone())
        .with_acquire_timeout(Duration::from_secs(args.connect_timeout_secs));
    let connector = Connector::new(store, args.retry_policy()?, args.pool_config())
        .with_probe(HealthProbe::new(Duration::from_millis(args.probe_timeout_ms)));
    let manager = Arc::new(ConnectionManager::new(
        connector,
        args.on_reconnect_failure.into(),
    ));
    manager
        .init()
        .await
        .context("Initial database connection failed")?;

    let cache = Arc::new(CacheInitializer::new(RedisDialer));
    cache
        .init(&args.redis_addr, Duration::from_secs(args.cache_timeout_secs))
        .await
        .context("Cache connection failed")?;

    let state = AppState::new(manager.clone(), cache);
    tracing::info!("Starting userbase server on {}", args.bind);

    let served = run_server(state, args.server_config(), shutdown_signal()).await;
    manager.close().await;
    served.context("Server error")?;

    Ok(())
}
