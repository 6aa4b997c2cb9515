// Backup engine: full and incremental tar.gz snapshots, schedules, retention, restore.
//
// Every backup stores the full file manifest of the server directory at that moment.
// An incremental archive holds only files whose hash or size changed against the
// previous backup's manifest, plus the list of deleted paths. The oldest retained backup
// is always full: before the base of a chain is evicted or deleted its incremental
// successor is rebuilt as a standalone full archive.

mod archive;
mod schedule;
mod scheduler;

pub use archive::{TRASH_PREFIX, is_excluded};
pub use schedule::ScheduleSpec;

use crate::error::{PanelError, Result};
use crate::models::{Backup, BackupKind, BackupManifest, BackupSettings, Server, now_ms};
use crate::notifications::NotificationCenter;
use crate::registry::ServerRegistry;
use crate::store::Store;
use crate::supervisor::Supervisor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::Duration;

const SAVED_MARKER: &str = "Saved the game";

#[derive(Debug, Clone)]
pub struct BackupDefaults {
    pub slots: u32,
    pub save_timeout: Duration,
    pub exclusions: Vec<String>,
}

impl From<&crate::config::BackupsConfig> for BackupDefaults {
    fn from(c: &crate::config::BackupsConfig) -> Self {
        Self {
            slots: c.default_slots,
            save_timeout: Duration::from_secs(c.save_timeout_secs),
            exclusions: c.default_exclusions.clone(),
        }
    }
}

pub struct BackupEngine {
    store: Arc<Store>,
    registry: Arc<ServerRegistry>,
    supervisor: Arc<Supervisor>,
    notifications: Arc<NotificationCenter>,
    backups_dir: PathBuf,
    defaults: BackupDefaults,
    schedulers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl BackupEngine {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<ServerRegistry>,
        supervisor: Arc<Supervisor>,
        notifications: Arc<NotificationCenter>,
        backups_dir: PathBuf,
        defaults: BackupDefaults,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry,
            supervisor,
            notifications,
            backups_dir,
            defaults,
            schedulers: Mutex::new(HashMap::new()),
        })
    }

    /// `<backups_dir>/<server_id>/<backup_id>.tar.gz`
    pub fn artifact_path(&self, server_id: &str, backup_id: &str) -> PathBuf {
        self.backups_dir
            .join(server_id)
            .join(format!("{}.tar.gz", backup_id))
    }

    fn default_settings(&self) -> BackupSettings {
        BackupSettings {
            schedule: None,
            kind: BackupKind::Full,
            slots: self.defaults.slots,
            exclusions: self.defaults.exclusions.clone(),
        }
    }

    pub async fn settings(&self, server_id: &str) -> Result<BackupSettings> {
        self.registry.get(server_id).await?;
        Ok(self
            .store
            .backup_settings(server_id)
            .await?
            .unwrap_or_else(|| self.default_settings()))
    }

    /// Validates and stores the settings, then replaces the server's scheduler task.
    pub async fn configure_schedule(
        self: &Arc<Self>,
        server_id: &str,
        settings: BackupSettings,
    ) -> Result<BackupSettings> {
        self.registry.get(server_id).await?;
        if let Some(spec) = &settings.schedule {
            spec.validate()?;
        }
        if settings.slots == 0 {
            return Err(PanelError::BadRequest("slots must be at least 1".into()));
        }
        self.store.save_backup_settings(server_id, &settings).await?;
        self.arm(server_id, settings.schedule.clone());
        tracing::info!(server_id, schedule = ?settings.schedule, slots = settings.slots, "backup settings updated");
        Ok(settings)
    }

    fn arm(self: &Arc<Self>, server_id: &str, schedule: Option<ScheduleSpec>) {
        let mut schedulers = self.schedulers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = schedulers.remove(server_id) {
            previous.abort();
        }
        if let Some(spec) = schedule {
            let handle = scheduler::spawn(Arc::downgrade(self), server_id.to_string(), spec);
            schedulers.insert(server_id.to_string(), handle);
        }
    }

    /// Arms schedulers for every server with a stored schedule (panel boot).
    pub async fn start_schedulers(self: &Arc<Self>) -> Result<usize> {
        let mut armed = 0;
        for server in self.registry.list().await {
            if let Some(settings) = self.store.backup_settings(&server.id).await?
                && settings.schedule.is_some()
            {
                self.arm(&server.id, settings.schedule);
                armed += 1;
            }
        }
        Ok(armed)
    }

    pub fn scheduled_count(&self) -> usize {
        self.schedulers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn shutdown(&self) {
        for (_, handle) in self
            .schedulers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
        {
            handle.abort();
        }
    }

    pub async fn list(&self, server_id: &str) -> Result<Vec<Backup>> {
        self.registry.get(server_id).await?;
        self.store.list_backups(server_id).await
    }

    /// Incremental without any full backup to build on fails with NoFullBackup.
    pub async fn create_manual_backup(
        &self,
        server_id: &str,
        kind: BackupKind,
        description: Option<String>,
    ) -> Result<Backup> {
        let _job = self.registry.locks().begin_job(server_id)?;
        let _guard = self.registry.locks().acquire(server_id).await;
        let settings = self.settings(server_id).await?;
        let description = description.unwrap_or_else(|| "Manual backup".into());
        let backup = self
            .backup_locked(server_id, kind, description, &settings)
            .await?;
        self.enforce_retention_locked(server_id, settings.slots).await?;
        Ok(backup)
    }

    /// One run of the server's schedule. Falls back to a full backup while no base exists.
    pub async fn run_scheduled(&self, server_id: &str) -> Result<Backup> {
        let _job = self.registry.locks().begin_job(server_id)?;
        let _guard = self.registry.locks().acquire(server_id).await;
        let settings = self.settings(server_id).await?;
        let mut kind = settings.kind;
        if kind == BackupKind::Incremental && self.store.list_backups(server_id).await?.is_empty() {
            tracing::info!(server_id, "no full backup yet, scheduled run takes a full backup");
            kind = BackupKind::Full;
        }
        let backup = self
            .backup_locked(server_id, kind, "Scheduled backup".into(), &settings)
            .await?;
        self.enforce_retention_locked(server_id, settings.slots).await?;
        Ok(backup)
    }

    async fn backup_locked(
        &self,
        server_id: &str,
        kind: BackupKind,
        description: String,
        settings: &BackupSettings,
    ) -> Result<Backup> {
        let server = self.registry.get(server_id).await?;
        let existing = self.store.list_backups(server_id).await?;
        let base = match (kind, existing.last()) {
            (BackupKind::Full, _) => None,
            (BackupKind::Incremental, None) => return Err(PanelError::NoFullBackup),
            (BackupKind::Incremental, Some(last)) => Some(self.store.backup_manifest(&last.id).await?),
        };

        let running = self.supervisor.is_running(server_id);
        if running {
            self.pause_saving(server_id).await?;
        }
        let result = self
            .snapshot(&server, kind, description, base, settings.exclusions.clone())
            .await;
        if running && let Err(e) = self.supervisor.send_command(server_id, "save-on").await {
            tracing::warn!(error = %e, server_id, "save-on failed");
        }

        let (backup, manifest) = result?;
        if let Err(e) = self.store.insert_backup(&backup, &manifest).await {
            let _ = tokio::fs::remove_file(self.artifact_path(server_id, &backup.id)).await;
            return Err(e);
        }
        tracing::info!(
            server_id,
            backup_id = %backup.id,
            kind = kind.as_str(),
            size = backup.size,
            files = backup.file_count,
            "backup created"
        );
        Ok(backup)
    }

    /// save-off, then save-all flush and wait for the world to be written.
    async fn pause_saving(&self, server_id: &str) -> Result<()> {
        self.supervisor.send_command(server_id, "save-off").await?;
        let saved = self
            .supervisor
            .command_and_wait(server_id, "save-all flush", SAVED_MARKER, self.defaults.save_timeout)
            .await?;
        if !saved {
            tracing::warn!(server_id, timeout_secs = self.defaults.save_timeout.as_secs(), "no save confirmation, continuing");
        }
        Ok(())
    }

    async fn snapshot(
        &self,
        server: &Server,
        kind: BackupKind,
        description: String,
        base: Option<BackupManifest>,
        exclusions: Vec<String>,
    ) -> Result<(Backup, BackupManifest)> {
        let id = uuid::Uuid::new_v4().to_string();
        let root = PathBuf::from(&server.directory);
        let dest = self.artifact_path(&server.id, &id);
        let (size, file_count, manifest) = tokio::task::spawn_blocking(move || {
            let mut manifest = archive::scan(&root, &exclusions)?;
            let paths = match &base {
                None => manifest.entries.iter().map(|e| e.path.clone()).collect(),
                Some(base) => {
                    let (changed, deleted) = archive::diff(base, &manifest);
                    manifest.deleted = deleted;
                    changed
                }
            };
            let size = archive::write_archive(&root, &paths, &dest)?;
            Ok::<_, std::io::Error>((size, paths.len() as u64, manifest))
        })
        .await??;
        let backup = Backup {
            id,
            server_id: server.id.clone(),
            kind,
            created_at: now_ms(),
            size,
            file_count,
            description,
        };
        Ok((backup, manifest))
    }

    /// Evicts oldest backups until at most `slots` remain.
    async fn enforce_retention_locked(&self, server_id: &str, slots: u32) -> Result<()> {
        loop {
            let backups = self.store.list_backups(server_id).await?;
            if backups.len() <= slots.max(1) as usize {
                return Ok(());
            }
            let oldest = &backups[0];
            tracing::info!(server_id, backup_id = %oldest.id, slots, "evicting oldest backup");
            self.remove_locked(server_id, &backups, 0).await?;
        }
    }

    pub async fn delete(&self, server_id: &str, backup_id: &str) -> Result<()> {
        let _job = self.registry.locks().begin_job(server_id)?;
        let _guard = self.registry.locks().acquire(server_id).await;
        let backups = self.store.list_backups(server_id).await?;
        let index = backups
            .iter()
            .position(|b| b.id == backup_id)
            .ok_or_else(|| PanelError::NotFound(format!("backup {}", backup_id)))?;
        self.remove_locked(server_id, &backups, index).await
    }

    /// Removes `backups[index]`; an incremental successor is first rebased into a full archive.
    async fn remove_locked(&self, server_id: &str, backups: &[Backup], index: usize) -> Result<()> {
        if let Some(next) = backups.get(index + 1)
            && next.kind == BackupKind::Incremental
        {
            self.rebase_locked(server_id, backups, index + 1).await?;
        }
        let target = &backups[index];
        self.store.delete_backup(&target.id).await?;
        match tokio::fs::remove_file(self.artifact_path(server_id, &target.id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, backup_id = %target.id, "backup artifact not removed"),
        }
        Ok(())
    }

    /// Backups needed to reproduce `backups[index]`: the nearest full at or before it,
    /// then every incremental up to it.
    fn chain(backups: &[Backup], index: usize) -> Result<&[Backup]> {
        let start = backups[..=index]
            .iter()
            .rposition(|b| b.kind == BackupKind::Full)
            .ok_or(PanelError::NoFullBackup)?;
        Ok(&backups[start..=index])
    }

    /// Replays `chain` into `dest` after clearing it; `keep` paths survive the clear.
    async fn materialize(
        &self,
        server_id: &str,
        chain: &[Backup],
        dest: &Path,
        keep: Vec<String>,
    ) -> Result<()> {
        let mut steps = Vec::with_capacity(chain.len());
        for backup in chain {
            let deleted = match backup.kind {
                BackupKind::Full => Vec::new(),
                BackupKind::Incremental => self.store.backup_manifest(&backup.id).await?.deleted,
            };
            steps.push((self.artifact_path(server_id, &backup.id), deleted));
        }
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || {
            archive::clear_dir(&dest, &keep)?;
            for (artifact, deleted) in steps {
                archive::remove_paths(&dest, &deleted)?;
                archive::extract(&artifact, &dest)?;
            }
            Ok::<_, std::io::Error>(())
        })
        .await??;
        Ok(())
    }

    async fn rebase_locked(&self, server_id: &str, backups: &[Backup], index: usize) -> Result<()> {
        let target = &backups[index];
        let chain = Self::chain(backups, index)?;
        let scratch = self.backups_dir.join(server_id).join(format!(".rebase-{}", target.id));
        let result = async {
            self.materialize(server_id, chain, &scratch, Vec::new()).await?;
            let dir = scratch.clone();
            let dest = self.artifact_path(server_id, &target.id);
            let (size, manifest) = tokio::task::spawn_blocking(move || {
                let manifest = archive::scan(&dir, &[])?;
                let paths: Vec<String> = manifest.entries.iter().map(|e| e.path.clone()).collect();
                let size = archive::write_archive(&dir, &paths, &dest)?;
                Ok::<_, std::io::Error>((size, manifest))
            })
            .await??;
            self.store
                .promote_backup(&target.id, size, manifest.entries.len() as u64, &manifest)
                .await?;
            tracing::info!(server_id, backup_id = %target.id, size, "incremental backup rebased to full");
            Ok::<_, PanelError>(())
        }
        .await;
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(error = %e, path = %scratch.display(), "rebase scratch dir not removed");
        }
        result
    }

    /// Destructive: stops the server, clears its directory (excluded paths and trash stay)
    /// and replays the backup chain.
    pub async fn restore(&self, server_id: &str, backup_id: &str) -> Result<Server> {
        let _job = self.registry.locks().begin_job(server_id)?;
        let _guard = self.registry.locks().acquire(server_id).await;
        let server = self.registry.get(server_id).await?;
        let backups = self.store.list_backups(server_id).await?;
        let index = backups
            .iter()
            .position(|b| b.id == backup_id)
            .ok_or_else(|| PanelError::NotFound(format!("backup {}", backup_id)))?;
        let chain = Self::chain(&backups, index)?;
        let keep = self.settings(server_id).await?.exclusions;

        self.supervisor.stop_locked(server_id).await?;
        tracing::info!(server_id, backup_id, chain = chain.len(), "restoring backup");
        self.materialize(server_id, chain, Path::new(&server.directory), keep)
            .await?;
        self.notifications
            .server_event(
                server_id,
                &server.name,
                "Backup restored",
                format!("{} was restored from a backup", server.name),
            )
            .await;
        self.registry.get(server_id).await
    }

    /// Drops the scheduler and every artifact of a deleted server.
    pub async fn purge(&self, server_id: &str) {
        if let Some(handle) = self
            .schedulers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id)
        {
            handle.abort();
        }
        let dir = self.backups_dir.join(server_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(error = %e, server_id, "backup directory not removed");
        }
    }

    pub(crate) async fn notify_failure(&self, server_id: &str, error: &PanelError) {
        let name = self
            .registry
            .get(server_id)
            .await
            .map(|s| s.name)
            .unwrap_or_else(|_| server_id.to_string());
        self.notifications
            .server_event(server_id, &name, "Backup failed", format!("Scheduled backup of {} failed: {}", name, error))
            .await;
    }
}
