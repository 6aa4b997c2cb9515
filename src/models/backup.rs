// Backup records, manifests and per-server backup settings

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use crate::backup::ScheduleSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    #[default]
    Full,
    Incremental,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::Incremental => "incremental",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(BackupKind::Full),
            "incremental" => Some(BackupKind::Incremental),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    pub server_id: String,
    pub kind: BackupKind,
    /// Unix ms.
    pub created_at: i64,
    /// Archive size in bytes.
    pub size: u64,
    /// Files stored in the archive (changed files only for incrementals).
    pub file_count: u64,
    #[serde(default)]
    pub description: String,
}

/// One file of a snapshot; stored as a wincode blob next to the backup row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub modified: i64,
    pub sha256: String,
}

/// Full file listing of the server directory at backup time, sorted by path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, SchemaRead, SchemaWrite)]
pub struct BackupManifest {
    pub entries: Vec<ManifestEntry>,
    /// Paths present in the previous backup but gone in this one (incrementals only).
    pub deleted: Vec<String>,
}

impl BackupManifest {
    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSettings {
    /// None = no automatic backups.
    #[serde(default)]
    pub schedule: Option<ScheduleSpec>,
    /// Kind produced by scheduled runs.
    #[serde(default)]
    pub kind: BackupKind,
    pub slots: u32,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

/// Body of `POST /api/server/{id}/backups`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBackupRequest {
    #[serde(default)]
    pub kind: BackupKind,
    #[serde(default)]
    pub description: Option<String>,
}
