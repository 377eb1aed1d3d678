use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use personnel::{
    build_photo_service,
    config::Config,
    models::EmployeeId,
    routes,
    services::orphan_sweeper::OrphanSweeper,
    AppState,
};

#[derive(Parser)]
#[command(name = "personnel", version, about = "Employee photo attachment service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default)
    Serve,
    /// Delete stored photos that no employee record references
    SweepOrphans {
        /// Only sweep this employee's key prefix
        #[arg(long)]
        employee_id: Option<EmployeeId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::SweepOrphans { employee_id } => sweep_orphans(config, employee_id).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let photo_service = build_photo_service(&config).await?;

    if let Some(minutes) = config.orphan_sweep_interval_minutes {
        OrphanSweeper::new(photo_service.clone(), Duration::from_secs(minutes * 60)).spawn();
    }

    let address = config.server_address.clone();
    let state = Arc::new(AppState { config, photo_service });
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Server listening on {}", address);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn sweep_orphans(config: Config, employee_id: Option<EmployeeId>) -> Result<()> {
    let photo_service = build_photo_service(&config).await?;

    let report = match employee_id {
        Some(id) => photo_service.sweep_orphans(&id).await?,
        None => photo_service.sweep_all_orphans().await?,
    };

    if report.failed > 0 {
        warn!("{} orphaned photos could not be deleted", report.failed);
    }
    info!(
        "Orphan sweep complete: {} scanned, {} deleted, {} failed, {} temp files purged",
        report.scanned, report.deleted, report.failed, report.purged
    );
    Ok(())
}
