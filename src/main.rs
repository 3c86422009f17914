//! mailforge - Main entry point
//!
//! Email campaign dispatch service: HTTP admission endpoints in front of a
//! SQLite-backed item store and a single background dispatch worker.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailforge::config::Config;
use mailforge::dispatch::{Dispatcher, WorkerContext};
use mailforge::services::{GroqClient, SmtpMailer};
use mailforge::{build_router, AppState};

/// Command-line arguments for mailforge
#[derive(Parser, Debug)]
#[command(name = "mailforge")]
#[command(about = "AI-personalized email campaign dispatch service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5000", env = "MAILFORGE_PORT")]
    port: u16,

    /// SQLite database path
    #[arg(short, long, default_value = "emails.db", env = "MAILFORGE_DATABASE")]
    database: PathBuf,

    /// Config file path (defaults to ./mailforge.toml when present)
    #[arg(short, long, env = "MAILFORGE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailforge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    info!("Starting mailforge on port {}", args.port);
    info!("Database: {}", args.database.display());

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let db = mailforge::db::init_database(&args.database)
        .await
        .context("Failed to initialize database")?;

    let generator =
        GroqClient::new(&config.generation).context("Failed to create generation client")?;

    let mailer = SmtpMailer::new(&config.smtp).context("Failed to create SMTP mailer")?;

    let dispatcher = Arc::new(Dispatcher::start(WorkerContext {
        db: db.clone(),
        generator: Arc::new(generator),
        mailer: Arc::new(mailer),
    }));

    let app = build_router(AppState::new(db, Arc::clone(&dispatcher)));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Server is down; let the worker drain whatever is already queued
    dispatcher
        .stop()
        .await
        .context("Failed to stop dispatcher")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
