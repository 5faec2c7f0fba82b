use std::sync::Arc;

use clap::{Parser, Subcommand};
use herald::{
    cmd::{TestNotificationArgs, test_notification},
    config::AppConfig,
    persistence::SqliteMetricsStore,
    supervisor::Supervisor,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the engine: admin API, periodic sweep and shutdown flush.
    Run {
        /// Directory containing `app.yaml`.
        #[arg(long)]
        config_dir: Option<String>,
    },
    /// Sends a test notification through a channel sender and prints the
    /// report.
    TestNotification(TestNotificationArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config_dir } => run_supervisor(config_dir.as_deref()).await?,
        Commands::TestNotification(args) => test_notification::execute(args).await?,
    }

    Ok(())
}

async fn run_supervisor(config_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!("Loading application configuration...");
    let config = AppConfig::new(config_dir)?;
    tracing::debug!(database_url = %config.database_url, channels = ?config.channels, "Configuration loaded.");

    tracing::debug!("Initializing metrics store...");
    let store = Arc::new(SqliteMetricsStore::new(&config.database_url).await?);
    store.run_migrations().await?;
    tracing::info!("Database migrations completed.");

    let supervisor = Supervisor::builder().config(config).store(store).build().await?;

    tracing::info!("Supervisor initialized, starting engine...");
    supervisor.run().await?;

    Ok(())
}
