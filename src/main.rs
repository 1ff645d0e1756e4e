use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flagkeeper::{api, config::Config, db};

#[derive(Parser)]
#[command(name = "flagkeeper")]
#[command(about = "Organization-scoped feature flags with revision history")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Apply pending database migrations and exit
    Migrate,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "flagkeeper=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(config: &Config) -> anyhow::Result<db::Database> {
    let database = match &config.database_path {
        Some(path) => db::Database::open(path.clone(), config.connect_timeout)?,
        None => db::Database::open_default(config.connect_timeout)?,
    };
    database.migrate()?;
    Ok(database)
}

async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting flagkeeper on port {}", port);

    let database = open_database(&config)?;
    let app = api::create_router(Arc::new(database), &config);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("flagkeeper listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::from_env()?;

    match cli.command {
        Some(Commands::Serve { port }) => serve(config, port).await?,
        Some(Commands::Migrate) => {
            open_database(&config)?;
            tracing::info!("Database is up to date");
        }
        None => serve(config, 3000).await?,
    }

    Ok(())
}
