// Per-server backup scheduler task. Re-arms from the schedule after every run; local time.

use super::{BackupEngine, ScheduleSpec};
use crate::error::PanelError;
use std::sync::Weak;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{info, warn};

pub(super) fn spawn(engine: Weak<BackupEngine>, server_id: String, spec: ScheduleSpec) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = chrono::Local::now();
            let next = match spec.next_after(&now) {
                Ok(next) => next,
                Err(e) => {
                    warn!(error = %e, server_id = %server_id, "backup schedule has no next run; scheduler stopped");
                    return;
                }
            };
            let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
            tracing::debug!(server_id = %server_id, next = %next, "next scheduled backup");
            tokio::time::sleep(delay).await;

            let Some(engine) = engine.upgrade() else {
                return;
            };
            match engine.run_scheduled(&server_id).await {
                Ok(backup) => info!(
                    server_id = %server_id,
                    backup_id = %backup.id,
                    kind = backup.kind.as_str(),
                    size = backup.size,
                    "scheduled backup complete"
                ),
                Err(PanelError::ServerBusy(_)) => {
                    info!(server_id = %server_id, "scheduled backup skipped, another job is running")
                }
                Err(PanelError::NotFound(_)) => return,
                Err(e) => {
                    warn!(error = %e, server_id = %server_id, operation = "scheduled_backup", "scheduled backup failed");
                    engine.notify_failure(&server_id, &e).await;
                }
            }
        }
    })
}
