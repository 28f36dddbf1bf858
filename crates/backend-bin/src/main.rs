// ============================
// crates/backend-bin/src/main.rs
// ============================
//! Tokio / Axum entry-point for the ScholarFlow API server.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scholarflow_backend_lib::{config::Settings, create_router, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "scholarflow")]
#[command(about = "ScholarFlow authentication and establishment API")]
struct Cli {
    /// Configuration file (defaults to ./config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Override the configured bind address
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Emit logs as JSON lines
        #[arg(long)]
        json_logs: bool,
    },
    /// Create an active, verified administrator account
    CreateAdmin {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    settings.validate().context("invalid configuration")?;
    Ok(settings)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_ref())?;

    match cli.command {
        Command::Serve { bind, json_logs } => {
            init_tracing(&settings.log_level, json_logs);
            if let Some(bind) = bind {
                settings.bind_addr = bind;
            }
            let addr = settings.bind_addr;

            let state = Arc::new(AppState::from_settings(settings)?);
            state.spawn_maintenance(MAINTENANCE_INTERVAL);
            let app = create_router(state);

            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("could not bind {addr}"))?;
            tracing::info!(%addr, "listening");

            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        },
        Command::CreateAdmin { email, password } => {
            init_tracing(&settings.log_level, false);
            let state = AppState::from_settings(settings)?;
            let account = state
                .auth
                .create_admin(&email, &password)
                .await
                .with_context(|| format!("could not create administrator {email}"))?;
            tracing::info!(user_id = account.id, matricule = %account.matricule, "administrator created");
        },
    }

    Ok(())
}
