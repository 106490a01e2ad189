//! # Harbor Agent
//!
//! Headless host for the Harbor network layer.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Harbor Agent                                  │
//! │                                                                         │
//! │  ConnectivityProbe ──► ConnectivitySignal ──► SyncCoordinator          │
//! │         │                     └──► cache warm-up   │                    │
//! │         ▼                                          ▼                    │
//! │     Backend (/api/health/)                 SQLite (harbor.db)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Commands
//! - `run` - Probe, warm the cache and drain until Ctrl+C
//! - `sync` - One manual drain cycle
//! - `status` - Pending and dead-lettered counts
//! - `dead-letters` - Records that exhausted their retries
//! - `requeue <collection> <id>` - Return a dead letter to the queue
//! - `fetch <path>` - Send one request through the interceptor

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use harbor_core::{Collection, HttpMethod, Request};
use harbor_db::{Database, DbConfig};
use harbor_sync::{
    connectivity, ConnectivityProbe, CoordinatorSettings, HarborConfig, HttpBackend,
    NetworkInterceptor, SessionCredentials, SharedSession, SyncCoordinator, TracingEmitter,
};

#[derive(Debug, Parser)]
#[command(name = "harbor-agent", version, about = "Offline-first network layer host")]
struct Cli {
    /// Path to harbor.toml (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe the backend and drain queued work until interrupted
    Run,
    /// Run one drain cycle now
    Sync,
    /// Print coordinator status
    Status,
    /// List dead-lettered records
    DeadLetters {
        /// Restrict to one collection
        #[arg(long)]
        collection: Option<Collection>,
    },
    /// Return a dead-lettered record to the queue
    Requeue { collection: Collection, id: i64 },
    /// Send a request through the interceptor
    Fetch {
        path: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: HttpMethod,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let cli = Cli::parse();
    let config = HarborConfig::load_or_default(cli.config);
    config.validate()?;

    match cli.command {
        Command::Run => run(&config).await,
        Command::Sync => sync_once(&config).await,
        Command::Status => status(&config).await,
        Command::DeadLetters { collection } => dead_letters(&config, collection).await,
        Command::Requeue { collection, id } => requeue(&config, collection, id).await,
        Command::Fetch { path, method, data } => fetch(&config, path, method, data).await,
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn run(config: &HarborConfig) -> Result<(), Box<dyn Error>> {
    info!("Starting Harbor agent");

    let db = open_store(config).await?;
    let backend = http_backend(config)?;

    let (signal, online) = connectivity(false);
    let probe = ConnectivityProbe::new(backend.clone(), signal, config);
    probe.check().await;
    let probe = probe.start();

    // Warm the shell cache the first time the backend is reachable
    let interceptor = NetworkInterceptor::new(Some(db.clone()), backend.clone(), online.clone(), config);
    let warmer = tokio::spawn({
        let mut online = online.clone();
        let paths = config.cache.precache.clone();
        async move {
            if online.wait_online().await.is_ok() {
                interceptor.warm_cache(&paths).await;
            }
        }
    });

    let coordinator = SyncCoordinator::with_emitter(
        db.clone(),
        backend,
        online,
        CoordinatorSettings::from(&config.sync),
        Arc::new(TracingEmitter),
    );
    let handle = coordinator.start();

    info!("Harbor agent running, press Ctrl+C to stop");
    shutdown_signal().await;

    warmer.abort();
    handle.shutdown().await;
    probe.shutdown().await;
    db.close().await;

    info!("Harbor agent stopped");
    Ok(())
}

async fn sync_once(config: &HarborConfig) -> Result<(), Box<dyn Error>> {
    let db = open_store(config).await?;
    let backend = http_backend(config)?;

    let (signal, online) = connectivity(false);
    let probe = ConnectivityProbe::new(backend.clone(), signal, config);
    probe.check().await;

    let coordinator = SyncCoordinator::with_emitter(
        db.clone(),
        backend,
        online,
        CoordinatorSettings::from(&config.sync),
        Arc::new(TracingEmitter),
    );

    let outcome = coordinator.manual_sync().await;
    println!("{outcome:?}");
    println!("{}", serde_json::to_string_pretty(&coordinator.status().await)?);

    db.close().await;
    Ok(())
}

async fn status(config: &HarborConfig) -> Result<(), Box<dyn Error>> {
    let db = open_store(config).await?;
    let counts = db.sync_queue().count_by_status().await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "database": config.store.database_path(),
            "pending": counts.pending,
            "synced": counts.synced,
            "dead_lettered": counts.failed,
        }))?
    );

    db.close().await;
    Ok(())
}

async fn dead_letters(config: &HarborConfig, collection: Option<Collection>) -> Result<(), Box<dyn Error>> {
    let db = open_store(config).await?;
    let records = db.sync_queue().dead_letters(collection).await?;

    if records.is_empty() {
        println!("No dead letters");
    }
    for record in records {
        println!(
            "{}/{}  retries={}  {}",
            record.collection,
            record.key,
            record.retries,
            record.last_error.as_deref().unwrap_or("-")
        );
    }

    db.close().await;
    Ok(())
}

async fn requeue(config: &HarborConfig, collection: Collection, id: i64) -> Result<(), Box<dyn Error>> {
    let db = open_store(config).await?;
    db.sync_queue().requeue(collection, id).await?;
    println!("Requeued {collection}/{id}");
    db.close().await;
    Ok(())
}

async fn fetch(
    config: &HarborConfig,
    path: String,
    method: HttpMethod,
    data: Option<String>,
) -> Result<(), Box<dyn Error>> {
    // A broken store degrades the interceptor instead of failing the request
    let db = Database::open_or_degrade(db_config(config)).await;
    let backend = http_backend(config)?;

    let (signal, online) = connectivity(false);
    let probe = ConnectivityProbe::new(backend.clone(), signal, config);
    probe.check().await;

    let interceptor = NetworkInterceptor::new(db.clone(), backend, online, config);
    if interceptor.is_degraded() {
        warn!("Store unavailable, requests go straight to the network");
    }

    let mut request = Request::new(method, path);
    if let Some(data) = data {
        let body: serde_json::Value = serde_json::from_str(&data)?;
        request = request.json(&body);
    }

    let response = interceptor.respond(request).await?;
    println!("{} ({:?})", response.status, response.served_from);
    println!("{}", response.text());

    if let Some(db) = db {
        db.close().await;
    }
    Ok(())
}

// =============================================================================
// Wiring
// =============================================================================

fn db_config(config: &HarborConfig) -> DbConfig {
    DbConfig::new(config.store.database_path()).max_connections(config.store.max_connections)
}

async fn open_store(config: &HarborConfig) -> Result<Database, Box<dyn Error>> {
    let path = config.store.database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!(?path, "Opening store");
    Ok(Database::new(db_config(config)).await?)
}

/// HTTP backend using the session from `HARBOR_SESSION_TOKEN` and
/// `HARBOR_CSRF_TOKEN`, when set.
fn http_backend(config: &HarborConfig) -> Result<Arc<HttpBackend>, Box<dyn Error>> {
    let session = match std::env::var("HARBOR_SESSION_TOKEN") {
        Ok(session_token) => SharedSession::with_credentials(SessionCredentials {
            session_token,
            csrf_token: std::env::var("HARBOR_CSRF_TOKEN").ok(),
        }),
        Err(_) => SharedSession::new(),
    };

    Ok(Arc::new(HttpBackend::new(&config.backend, Arc::new(session))?))
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=harbor_sync=trace` - Trace the network layer only
/// - Default: INFO, DEBUG for harbor crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,harbor=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
