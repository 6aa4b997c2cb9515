// Notification center: persisted list plus a watch channel carrying the full snapshot.

use crate::error::{PanelError, Result};
use crate::models::{Notification, NotificationAction, SenderType, now_ms};
use crate::store::Store;
use std::sync::Arc;
use tokio::sync::watch;

/// Client actions of `POST /api/notifications/{action}/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagAction {
    Archive,
    Read,
    Unread,
}

impl FlagAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "archive" => Some(FlagAction::Archive),
            "read" => Some(FlagAction::Read),
            "unread" => Some(FlagAction::Unread),
            _ => None,
        }
    }
}

pub struct NotificationCenter {
    store: Arc<Store>,
    tx: watch::Sender<Vec<Notification>>,
}

impl NotificationCenter {
    pub async fn load(store: Arc<Store>) -> Result<Arc<Self>> {
        let initial = store.list_notifications().await?;
        let (tx, _) = watch::channel(initial);
        Ok(Arc::new(Self { store, tx }))
    }

    /// Receiver whose current value is the full list, newest first.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.tx.borrow().clone()
    }

    pub async fn push(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        sender: impl Into<String>,
        sender_type: SenderType,
        action: Vec<NotificationAction>,
    ) -> Result<Notification> {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            message: message.into(),
            read: false,
            archived: false,
            action,
            sender: sender.into(),
            sender_type,
            date: now_ms(),
        };
        self.store.insert_notification(&notification).await?;
        let n = notification.clone();
        self.tx.send_modify(|list| list.insert(0, n));
        Ok(notification)
    }

    /// Fire-and-forget notification from a server; failures are only logged.
    pub async fn server_event(&self, server_id: &str, server_name: &str, title: &str, message: String) {
        let action = vec![NotificationAction {
            label: "Open".into(),
            href: format!("/server/{}", server_id),
        }];
        if let Err(e) = self
            .push(title, message, server_name, SenderType::Server, action)
            .await
        {
            tracing::warn!(error = %e, server_id, operation = "push_notification", "notification failed");
        }
    }

    pub async fn apply(&self, id: &str, action: FlagAction) -> Result<Notification> {
        let current = self
            .snapshot()
            .into_iter()
            .find(|n| n.id == id)
            .ok_or_else(|| PanelError::NotFound(format!("notification {}", id)))?;
        let (read, archived) = match action {
            FlagAction::Archive => (current.read, true),
            FlagAction::Read => (true, current.archived),
            FlagAction::Unread => (false, current.archived),
        };
        if !self.store.set_notification_flags(id, read, archived).await? {
            return Err(PanelError::NotFound(format!("notification {}", id)));
        }
        let mut updated = current;
        updated.read = read;
        updated.archived = archived;
        let u = updated.clone();
        self.tx.send_modify(|list| {
            if let Some(slot) = list.iter_mut().find(|n| n.id == u.id) {
                *slot = u;
            }
        });
        Ok(updated)
    }
}
