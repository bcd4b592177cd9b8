//! userbase CLI - runs the user API server and its schema migrations

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod tracing_setup;

use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "userbase",
    author,
    version,
    about = "User API server backed by Postgres and Redis",
    long_about = "Serves user CRUD over HTTP. The shared database pool is health-checked on every \
                  request and rebuilt transparently when the connection drops."
)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (requires the `telemetry` feature)
    #[arg(long, global = true)]
    otel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Apply pending schema migrations and exit
    Migrate(commands::serve::DatabaseArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real deployments use the environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    tracing_setup::init(&TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })
    .ok();

    let result = match cli.command {
        Commands::Serve(args) => commands::run_serve(args).await,
        Commands::Migrate(args) => commands::run_migrations(&args).await,
    };

    tracing_setup::shutdown();
    result
}
