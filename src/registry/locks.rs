// Per-server operation locks and backup/restore job flags.
// Different servers never contend; one server's mutating operations run one at a time.

use crate::error::{PanelError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
pub struct ServerLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    jobs: Arc<Mutex<HashSet<String>>>,
}

/// Exclusive ownership of a server directory; released on drop.
pub type OperationGuard = OwnedMutexGuard<()>;

/// Marks a backup or restore as in flight; cleared on drop.
pub struct JobGuard {
    server_id: String,
    jobs: Arc<Mutex<HashSet<String>>>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.server_id);
    }
}

impl ServerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, server_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(server_id.to_string())
            .or_default()
            .clone()
    }

    /// Waits for exclusive access to the server directory.
    pub async fn acquire(&self, server_id: &str) -> OperationGuard {
        self.lock_for(server_id).lock_owned().await
    }

    /// Fails with ServerBusy when a backup or restore already runs for this server.
    pub fn begin_job(&self, server_id: &str) -> Result<JobGuard> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if !jobs.insert(server_id.to_string()) {
            return Err(PanelError::ServerBusy(server_id.to_string()));
        }
        Ok(JobGuard {
            server_id: server_id.to_string(),
            jobs: self.jobs.clone(),
        })
    }

    pub fn job_running(&self, server_id: &str) -> bool {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(server_id)
    }

    pub fn forget(&self, server_id: &str) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id);
    }
}
