use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::services::photo_service::PhotoService;

/// Periodically removes photo blobs no employee record references.
///
/// Cleanup in the request path is best-effort; this catches blobs left behind by
/// failed deletes or by registry writes that failed after a successful upload.
pub struct OrphanSweeper {
    photo_service: Arc<PhotoService>,
    interval: Duration,
}

impl OrphanSweeper {
    pub fn new(photo_service: Arc<PhotoService>, interval: Duration) -> Self {
        Self { photo_service, interval }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        info!("Orphan sweep scheduled every {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup is not slowed by a sweep
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    async fn sweep_once(&self) {
        debug!("Starting orphan sweep");
        match self.photo_service.sweep_all_orphans().await {
            Ok(report) if report.deleted > 0 || report.failed > 0 || report.purged > 0 => info!(
                "Orphan sweep finished: {} scanned, {} deleted, {} failed, {} temp files purged",
                report.scanned, report.deleted, report.failed, report.purged
            ),
            Ok(report) => debug!("Orphan sweep found nothing to delete ({} scanned)", report.scanned),
            Err(e) => warn!("Orphan sweep aborted: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmployeeId;
    use crate::storage::StorageKey;
    use crate::test_helpers::create_local_photo_context;

    #[tokio::test]
    async fn sweep_once_removes_unreferenced_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = create_local_photo_context(dir.path()).await;
        let id = EmployeeId::parse("77").unwrap();
        ctx.store.insert_employee(&id);

        let stray = StorageKey::derive(&id, chrono::Utc::now());
        ctx.backend.inner().put(&stray, b"leftover").await.unwrap();

        OrphanSweeper::new(ctx.service.clone(), Duration::from_secs(3600)).sweep_once().await;

        assert!(ctx.backend.inner().list_keys(&id.key_prefix()).await.unwrap().is_empty());
    }
}
