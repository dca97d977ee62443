use clap::{Parser, Subcommand};
use tablebook_reservation_service::config::Config;
use tracing_subscriber::EnvFilter;

pub mod app;

#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the reservation and submission gRPC services.
    Rpc,
    /// Relay outbox rows to Kafka.
    Producer,
}

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    match cli.command {
        Commands::Rpc => app::rpc::main(config).await,
        Commands::Producer => app::producer::main(config).await,
    }
}
