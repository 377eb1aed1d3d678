//! Migration utility to move employee photos into the active storage backend
//!
//! Usage: cargo run --bin migrate_photos -- [--dry-run] [--keep-source]
//!
//! This utility will:
//! 1. Connect to the database and every configured photo backend
//! 2. Find employees whose photo lives outside the active backend
//! 3. Copy each photo to the active backend and repoint the record
//! 4. Delete the old copy unless --keep-source is given
//! 5. Clear pointers whose photo has already disappeared

use anyhow::Result;
use clap::Parser;
use std::collections::HashMap;
use tracing::{error, info, warn};

use personnel::{
    build_photo_service,
    config::Config,
    models::EmployeeId,
    services::photo_service::{MigrationOptions, MigrationOutcome},
};

#[derive(Parser)]
#[command(name = "migrate_photos")]
#[command(about = "Move employee photos into the active storage backend")]
struct Args {
    /// Dry run - only show what would be migrated
    #[arg(short, long)]
    dry_run: bool,

    /// Leave the old copy in place after a successful move
    #[arg(long)]
    keep_source: bool,

    /// Limit number of employees to process
    #[arg(short, long)]
    limit: Option<usize>,

    /// Only migrate this employee
    #[arg(short, long)]
    employee_id: Option<EmployeeId>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let args = Args::parse();

    info!("🚀 Starting photo migration utility");

    let config = Config::from_env()?;
    info!("📁 Target backend: {}", config.photo_backend);

    let photo_service = build_photo_service(&config).await?;

    let mut employee_ids = match &args.employee_id {
        Some(id) => vec![id.clone()],
        None => photo_service.employee_ids().await?,
    };
    if let Some(limit) = args.limit {
        employee_ids.truncate(limit);
    }

    info!("📋 Checking {} employees", employee_ids.len());

    let options = MigrationOptions {
        dry_run: args.dry_run,
        keep_source: args.keep_source,
    };

    let mut migrated: HashMap<String, usize> = HashMap::new();
    let mut pending = 0usize;
    let mut repaired = 0usize;
    let mut failures: Vec<(EmployeeId, String)> = Vec::new();

    for id in &employee_ids {
        match photo_service.migrate_pointer(id, options).await {
            Ok(MigrationOutcome::NoPhoto) | Ok(MigrationOutcome::AlreadyActive) => {}
            Ok(MigrationOutcome::WouldMigrate { from }) => {
                info!("  - {} (currently in {})", id, from);
                pending += 1;
            }
            Ok(MigrationOutcome::Migrated { from }) => {
                info!("✅ Migrated photo of {} from {}", id, from);
                *migrated.entry(from.to_string()).or_default() += 1;
            }
            Ok(MigrationOutcome::Repaired { from }) => {
                warn!("🧹 Photo of {} was missing from {}; pointer cleared", id, from);
                repaired += 1;
            }
            Err(e) => {
                error!("❌ Failed to migrate photo of {}: {}", id, e);
                failures.push((id.clone(), e.to_string()));
            }
        }
    }

    if args.dry_run {
        info!("🔍 DRY RUN - {} photos would be migrated", pending);
        info!("💡 Run without --dry-run to perform actual migration");
        return Ok(());
    }

    let total: usize = migrated.values().sum();
    info!("📊 Migration summary: {} migrated, {} repaired, {} failed", total, repaired, failures.len());
    for (from, count) in &migrated {
        info!("   {} from {}", count, from);
    }

    if !failures.is_empty() {
        for (id, reason) in &failures {
            error!("   {}: {}", id, reason);
        }
        anyhow::bail!("{} photos could not be migrated", failures.len());
    }

    Ok(())
}
