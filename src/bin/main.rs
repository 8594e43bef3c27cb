//! crashhub CLI — ingestion, aggregation, and alerting server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use crashhub::alert::Alerter;
use crashhub::blob::BlobStore;
use crashhub::config::Config;
use crashhub::retention::RetentionSweeper;
use crashhub::store::IndexedStore;
use crashhub::web::{create_router, AppState};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crashhub")]
#[command(about = "Crash report ingestion, grouping, and alerting")]
struct Cli {
    /// Path to a TOML config file layered under CLI flags and environment
    /// variables.
    #[arg(long, global = true, env = "CRASHHUB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server: ingestion, admin endpoints, alerting, retention.
    Serve {
        #[arg(long, env = "CRASHHUB_PORT")]
        port: Option<u16>,

        #[arg(long, env = "CRASHHUB_DB")]
        db: Option<PathBuf>,

        #[arg(long, env = "CRASHHUB_BLOB_ROOT")]
        blob_root: Option<PathBuf>,
    },

    /// Register a new application and print its one-time ingestion credential.
    CreateApp {
        #[arg(long)]
        name: String,

        #[arg(long, env = "CRASHHUB_DB")]
        db: Option<PathBuf>,

        #[arg(long)]
        retention_days: Option<i64>,
    },

    /// Run one retention sweep immediately and exit.
    Sweep {
        #[arg(long, env = "CRASHHUB_DB")]
        db: Option<PathBuf>,

        #[arg(long, env = "CRASHHUB_BLOB_ROOT")]
        blob_root: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::default();
    if let Some(path) = path {
        let contents = std::fs::read_to_string(path)?;
        config = config.merge_file(&contents)?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Serve { port, db, blob_root } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(db) = db {
                config.db_path = db;
            }
            if let Some(blob_root) = blob_root {
                config.blob_root = blob_root;
            }
            serve(config).await
        }
        Commands::CreateApp { name, db, retention_days } => {
            if let Some(db) = db {
                config.db_path = db;
            }
            if let Some(days) = retention_days {
                config.default_retention_days = days;
            }
            create_app(config, name)
        }
        Commands::Sweep { db, blob_root } => {
            if let Some(db) = db {
                config.db_path = db;
            }
            if let Some(blob_root) = blob_root {
                config.blob_root = blob_root;
            }
            sweep_once(config).await
        }
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(Mutex::new(IndexedStore::open(&config.db_path)?));
    let blobs = Arc::new(BlobStore::new(&config.blob_root)?);
    let alerter = Alerter::new(config.alerter_config());
    {
        let store = store.lock().await;
        alerter.set_rules(store.list_all_alert_rules()?).await;
    }

    let sweeper = Arc::new(RetentionSweeper::new(
        store.clone(),
        blobs.clone(),
        config.sweep_interval,
        config.default_retention_days,
    ));
    let _sweep_handle = sweeper.spawn();

    let state = Arc::new(AppState { store, blobs, alerter });

    let router = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "crashhub listening");

    axum::serve(listener, router).await?;
    Ok(())
}

fn create_app(config: Config, name: String) -> Result<(), Box<dyn std::error::Error>> {
    let store = IndexedStore::open(&config.db_path)?;
    let app_id = uuid::Uuid::new_v4().to_string();
    let api_key = uuid::Uuid::new_v4().to_string();
    let api_key_hash = {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(api_key.as_bytes()))
    };

    store.create_app(&app_id, &name, &api_key_hash, config.default_retention_days)?;

    println!("app created:");
    println!("  app_id:  {}", app_id);
    println!("  name:    {}", name);
    println!("  api_key: {}", api_key);
    println!();
    println!("the api_key above is shown once; store it securely.");
    Ok(())
}

async fn sweep_once(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(Mutex::new(IndexedStore::open(&config.db_path)?));
    let blobs = Arc::new(BlobStore::new(&config.blob_root)?);
    let sweeper = RetentionSweeper::new(store, blobs, config.sweep_interval, config.default_retention_days);
    let removed = sweeper.run_now().await?;
    println!("retention sweep removed {} crash rows", removed);
    Ok(())
}
