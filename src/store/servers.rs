use super::Store;
use crate::error::{PanelError, Result};
use crate::models::{LoaderType, Server, ServerStatus};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::instrument;

const SERVER_COLUMNS: &str = "id, name, owner, members, created_at, updated_at, instance, auto_start, min_ram, max_ram, executable, minecraft_arguments, java_arguments, java_path, minecraft_version, loader_type, loader_version, directory, port";

impl Store {
    pub async fn list_servers(&self) -> Result<Vec<Server>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM servers ORDER BY created_at ASC",
            SERVER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_server_row).collect()
    }

    /// Insert or replace the persisted fields of a server. Runtime fields are not stored.
    #[instrument(skip(self, server), fields(repo = "store", operation = "save_server", server_id = %server.id))]
    pub async fn save_server(&self, server: &Server) -> Result<()> {
        let members = serde_json::to_string(&server.members)
            .map_err(|e| PanelError::Internal(anyhow::anyhow!("members json: {}", e)))?;
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO servers ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
            SERVER_COLUMNS
        ))
        .bind(&server.id)
        .bind(&server.name)
        .bind(&server.owner)
        .bind(&members)
        .bind(server.created_at)
        .bind(server.updated_at)
        .bind(&server.instance)
        .bind(server.auto_start)
        .bind(server.min_ram as i64)
        .bind(server.max_ram as i64)
        .bind(&server.executable)
        .bind(&server.minecraft_arguments)
        .bind(&server.java_arguments)
        .bind(&server.java_path)
        .bind(&server.minecraft_version)
        .bind(server.loader_type.as_str())
        .bind(&server.loader_version)
        .bind(&server.directory)
        .bind(server.port as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove the server row together with its backup rows and settings.
    #[instrument(skip(self), fields(repo = "store", operation = "delete_server"))]
    pub async fn delete_server(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM servers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM backups WHERE server_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM backup_settings WHERE server_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn parse_server_row(row: &SqliteRow) -> Result<Server> {
    let members: String = row.try_get("members")?;
    let members: Vec<String> = serde_json::from_str(&members).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "members json unreadable, using empty");
        Vec::new()
    });
    let loader: String = row.try_get("loader_type")?;
    let min_ram: i64 = row.try_get("min_ram")?;
    let max_ram: i64 = row.try_get("max_ram")?;
    let port: i64 = row.try_get("port")?;
    Ok(Server {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        owner: row.try_get("owner")?,
        members,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        instance: row.try_get("instance")?,
        size: 0,
        auto_start: row.try_get("auto_start")?,
        min_ram: min_ram as u32,
        max_ram: max_ram as u32,
        executable: row.try_get("executable")?,
        minecraft_arguments: row.try_get("minecraft_arguments")?,
        java_arguments: row.try_get("java_arguments")?,
        java_path: row.try_get("java_path")?,
        minecraft_version: row.try_get("minecraft_version")?,
        loader_type: LoaderType::parse(&loader).unwrap_or_default(),
        loader_version: row.try_get("loader_version")?,
        directory: row.try_get("directory")?,
        port: port as u16,
        status: ServerStatus::Offline,
        uptime: 0,
        cpu_usage: 0.0,
        memory_usage: 0,
    })
}
