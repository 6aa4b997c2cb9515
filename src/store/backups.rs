use super::{Store, blob};
use crate::error::{PanelError, Result};
use crate::models::{Backup, BackupKind, BackupManifest, BackupSettings};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::instrument;

impl Store {
    /// Backups of a server, oldest first.
    pub async fn list_backups(&self, server_id: &str) -> Result<Vec<Backup>> {
        let rows = sqlx::query(
            "SELECT id, server_id, kind, created_at, size, file_count, description
             FROM backups WHERE server_id = $1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_backup_row).collect()
    }

    #[instrument(skip(self, backup, manifest), fields(repo = "store", operation = "insert_backup", backup_id = %backup.id))]
    pub async fn insert_backup(&self, backup: &Backup, manifest: &BackupManifest) -> Result<()> {
        let manifest_blob = blob::encode_manifest(manifest)?;
        sqlx::query(
            "INSERT INTO backups (id, server_id, kind, created_at, size, file_count, description, manifest)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&backup.id)
        .bind(&backup.server_id)
        .bind(backup.kind.as_str())
        .bind(backup.created_at)
        .bind(backup.size as i64)
        .bind(backup.file_count as i64)
        .bind(&backup.description)
        .bind(&manifest_blob)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn backup_manifest(&self, backup_id: &str) -> Result<BackupManifest> {
        let row = sqlx::query("SELECT manifest FROM backups WHERE id = $1")
            .bind(backup_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PanelError::NotFound(format!("backup {}", backup_id)))?;
        let bytes: Vec<u8> = row.try_get("manifest")?;
        blob::decode_manifest(&bytes)
    }

    /// Turn an incremental into a full backup after its archive was rebuilt standalone.
    #[instrument(skip(self, manifest), fields(repo = "store", operation = "promote_backup"))]
    pub async fn promote_backup(
        &self,
        backup_id: &str,
        size: u64,
        file_count: u64,
        manifest: &BackupManifest,
    ) -> Result<()> {
        let manifest_blob = blob::encode_manifest(manifest)?;
        sqlx::query(
            "UPDATE backups SET kind = $1, size = $2, file_count = $3, manifest = $4 WHERE id = $5",
        )
        .bind(BackupKind::Full.as_str())
        .bind(size as i64)
        .bind(file_count as i64)
        .bind(&manifest_blob)
        .bind(backup_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "store", operation = "delete_backup"))]
    pub async fn delete_backup(&self, backup_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM backups WHERE id = $1")
            .bind(backup_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn backup_settings(&self, server_id: &str) -> Result<Option<BackupSettings>> {
        let row = sqlx::query("SELECT data FROM backup_settings WHERE server_id = $1")
            .bind(server_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row.try_get("data")?;
        let settings = serde_json::from_str(&data)
            .map_err(|e| PanelError::Internal(anyhow::anyhow!("backup settings json: {}", e)))?;
        Ok(Some(settings))
    }

    pub async fn save_backup_settings(
        &self,
        server_id: &str,
        settings: &BackupSettings,
    ) -> Result<()> {
        let data = serde_json::to_string(settings)
            .map_err(|e| PanelError::Internal(anyhow::anyhow!("backup settings json: {}", e)))?;
        sqlx::query("INSERT OR REPLACE INTO backup_settings (server_id, data) VALUES ($1, $2)")
            .bind(server_id)
            .bind(&data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_backup_row(row: &SqliteRow) -> Result<Backup> {
    let kind: String = row.try_get("kind")?;
    let size: i64 = row.try_get("size")?;
    let file_count: i64 = row.try_get("file_count")?;
    Ok(Backup {
        id: row.try_get("id")?,
        server_id: row.try_get("server_id")?,
        kind: BackupKind::parse(&kind).unwrap_or_default(),
        created_at: row.try_get("created_at")?,
        size: size as u64,
        file_count: file_count as u64,
        description: row.try_get("description")?,
    })
}
