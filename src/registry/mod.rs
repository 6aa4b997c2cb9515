// In-memory server registry with write-through persistence.
// Runtime fields (status, uptime, usage, size) only live here. Every mutation is published
// to the state broadcaster while the write lock is held, so subscribers see changes in the
// order they were applied.

mod locks;

pub use locks::{JobGuard, OperationGuard, ServerLocks};

use crate::broadcaster::StateBroadcaster;
use crate::error::{PanelError, Result};
use crate::models::{Server, now_ms};
use crate::store::Store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct ServerRegistry {
    store: Arc<Store>,
    broadcaster: Arc<StateBroadcaster>,
    servers: RwLock<HashMap<String, Server>>,
    locks: ServerLocks,
    servers_dir: PathBuf,
}

impl ServerRegistry {
    /// Load every persisted server; all start Offline and are published once.
    pub async fn load(
        store: Arc<Store>,
        broadcaster: Arc<StateBroadcaster>,
        servers_dir: PathBuf,
    ) -> Result<Self> {
        let servers = store.list_servers().await?;
        for server in &servers {
            broadcaster.publish(server);
        }
        tracing::info!(servers = servers.len(), "server registry loaded");
        Ok(Self {
            store,
            broadcaster,
            servers: RwLock::new(servers.into_iter().map(|s| (s.id.clone(), s)).collect()),
            locks: ServerLocks::new(),
            servers_dir,
        })
    }

    pub fn locks(&self) -> &ServerLocks {
        &self.locks
    }

    pub fn servers_dir(&self) -> &PathBuf {
        &self.servers_dir
    }

    /// All servers ordered by creation time.
    pub async fn list(&self) -> Vec<Server> {
        let mut out: Vec<Server> = self.servers.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn get(&self, id: &str) -> Result<Server> {
        self.servers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PanelError::NotFound(format!("server {}", id)))
    }

    /// Absolute root directory of a server.
    pub async fn root_of(&self, id: &str) -> Result<PathBuf> {
        let server = self.get(id).await?;
        Ok(PathBuf::from(server.directory))
    }

    pub async fn insert(&self, server: Server) -> Result<Server> {
        self.store.save_server(&server).await?;
        let mut servers = self.servers.write().await;
        self.broadcaster.publish(&server);
        servers.insert(server.id.clone(), server.clone());
        Ok(server)
    }

    /// Apply a change to persisted fields and write it through.
    pub async fn update<F>(&self, id: &str, f: F) -> Result<Server>
    where
        F: FnOnce(&mut Server),
    {
        let updated = {
            let mut servers = self.servers.write().await;
            let server = servers
                .get_mut(id)
                .ok_or_else(|| PanelError::NotFound(format!("server {}", id)))?;
            f(server);
            server.updated_at = now_ms();
            self.broadcaster.publish(server);
            server.clone()
        };
        self.store.save_server(&updated).await?;
        Ok(updated)
    }

    /// Apply a change to runtime-only fields (no persistence).
    pub async fn update_runtime<F>(&self, id: &str, f: F) -> Option<Server>
    where
        F: FnOnce(&mut Server),
    {
        let mut servers = self.servers.write().await;
        let server = servers.get_mut(id)?;
        f(server);
        self.broadcaster.publish(server);
        Some(server.clone())
    }

    /// Drops the server and closes its state streams.
    pub async fn remove(&self, id: &str) -> Result<Server> {
        let removed = {
            let mut servers = self.servers.write().await;
            let removed = servers
                .remove(id)
                .ok_or_else(|| PanelError::NotFound(format!("server {}", id)))?;
            self.broadcaster.remove(id);
            removed
        };
        self.store.delete_server(id).await?;
        self.locks.forget(id);
        Ok(removed)
    }
}
