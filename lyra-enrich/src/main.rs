//! lyra-enrich - media-enrichment service
//!
//! Startup order:
//! 1. Bootstrap TOML, then logging (RUST_LOG wins over the TOML level)
//! 2. Root folder and database
//! 3. Provider clients, vector index and local object storage
//! 4. Event worker, then the HTTP server
//!
//! Ctrl+C / SIGTERM stops the server, cancels in-flight enrichment runs and
//! waits for the worker to drain.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lyra_common::config::{load_toml_config, resolve_root_folder};
use lyra_enrich::event_worker::EventWorker;
use lyra_enrich::{build_router, config, db, AppState, Collaborators};

/// Command-line arguments for lyra-enrich
#[derive(Parser, Debug)]
#[command(name = "lyra-enrich")]
#[command(about = "Lyrics, captions, embeddings and hybrid search for uploaded songs")]
#[command(version)]
struct Args {
    /// Port to listen on (defaults to the TOML value)
    #[arg(short, long, env = "LYRA_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and local media
    #[arg(short, long, env = "LYRA_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML file
    #[arg(short, long, env = "LYRA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging is not up yet, so a broken config file is reported by anyhow
    let toml = load_toml_config(args.config.as_deref()).context("Failed to load config")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&toml.logging.level))
                .unwrap_or_else(|_| EnvFilter::new("lyra_enrich=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting lyra-enrich v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml);
    std::fs::create_dir_all(&root_folder).with_context(|| {
        format!("Failed to create root folder {}", root_folder.display())
    })?;
    info!("Root folder: {}", root_folder.display());

    let db_path = config::database_path(&root_folder);
    let pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database: {}", db_path.display());

    let collaborators = Collaborators::from_config(&pool, &toml, &root_folder)
        .await
        .context("Failed to initialize collaborators")?;

    let shutdown = CancellationToken::new();
    let state = AppState::assemble(pool, &toml, collaborators, shutdown.clone());

    // Subscribe before serving so no trigger is published into an empty bus
    let worker = EventWorker::new(state.orchestrator.clone(), toml.worker.max_concurrent_runs)
        .spawn(state.event_bus.subscribe(), shutdown.clone());

    let app = build_router(state);

    let port = args.port.unwrap_or(toml.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = worker.await {
        warn!(error = %e, "Event worker terminated abnormally");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels `shutdown`
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }

    shutdown.cancel();
}
