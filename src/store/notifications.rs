use super::Store;
use crate::error::{PanelError, Result};
use crate::models::{Notification, SenderType};
use sqlx::Row;

impl Store {
    /// All notifications, newest first.
    pub async fn list_notifications(&self) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT id, title, message, read, archived, actions, sender, sender_type, date
             FROM notifications ORDER BY date DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let actions: String = row.try_get("actions")?;
            let sender_type: String = row.try_get("sender_type")?;
            out.push(Notification {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                message: row.try_get("message")?,
                read: row.try_get("read")?,
                archived: row.try_get("archived")?,
                action: serde_json::from_str(&actions).unwrap_or_default(),
                sender: row.try_get("sender")?,
                sender_type: SenderType::parse(&sender_type),
                date: row.try_get("date")?,
            });
        }
        Ok(out)
    }

    pub async fn insert_notification(&self, n: &Notification) -> Result<()> {
        let actions = serde_json::to_string(&n.action)
            .map_err(|e| PanelError::Internal(anyhow::anyhow!("actions json: {}", e)))?;
        sqlx::query(
            "INSERT INTO notifications (id, title, message, read, archived, actions, sender, sender_type, date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&n.id)
        .bind(&n.title)
        .bind(&n.message)
        .bind(n.read)
        .bind(n.archived)
        .bind(&actions)
        .bind(&n.sender)
        .bind(n.sender_type.as_str())
        .bind(n.date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns false when no notification has this id.
    pub async fn set_notification_flags(&self, id: &str, read: bool, archived: bool) -> Result<bool> {
        let r = sqlx::query("UPDATE notifications SET read = $1, archived = $2 WHERE id = $3")
            .bind(read)
            .bind(archived)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected() > 0)
    }
}
