// Server lifecycle outside the process: create, update, delete, visibility, size refresh.

use crate::backup::{BackupEngine, TRASH_PREFIX};
use crate::error::{PanelError, Result};
use crate::minecraft::ServerInstaller;
use crate::minecraft::install::default_executable;
use crate::models::{
    CreateServerRequest, SenderType, Server, ServerStatus, UpdateServerRequest, UserProfile,
    now_ms,
};
use crate::notifications::NotificationCenter;
use crate::registry::ServerRegistry;
use crate::supervisor::Supervisor;
use std::sync::Arc;

pub struct ServerService {
    registry: Arc<ServerRegistry>,
    supervisor: Arc<Supervisor>,
    backups: Arc<BackupEngine>,
    notifications: Arc<NotificationCenter>,
    installer: Arc<ServerInstaller>,
    install_jars: bool,
}

impl ServerService {
    pub fn new(
        registry: Arc<ServerRegistry>,
        supervisor: Arc<Supervisor>,
        backups: Arc<BackupEngine>,
        notifications: Arc<NotificationCenter>,
        installer: Arc<ServerInstaller>,
        install_jars: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            supervisor,
            backups,
            notifications,
            installer,
            install_jars,
        })
    }

    pub async fn list_for(&self, user: &UserProfile) -> Vec<Server> {
        self.registry
            .list()
            .await
            .into_iter()
            .filter(|s| s.is_visible_to(&user.username, user.admin))
            .collect()
    }

    /// Servers the user may not see are reported as missing.
    pub async fn get_for(&self, user: &UserProfile, id: &str) -> Result<Server> {
        let server = self.registry.get(id).await?;
        if !server.is_visible_to(&user.username, user.admin) {
            return Err(PanelError::NotFound(format!("server {}", id)));
        }
        Ok(server)
    }

    pub async fn create(self: &Arc<Self>, owner: &UserProfile, req: CreateServerRequest) -> Result<Server> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(PanelError::BadRequest("name must be non-empty".into()));
        }
        if req.minecraft_version.trim().is_empty() {
            return Err(PanelError::BadRequest("minecraft_version must be non-empty".into()));
        }
        if req.port == 0 {
            return Err(PanelError::BadRequest("port must be between 1 and 65535".into()));
        }
        if req.min_ram == 0 || req.min_ram > req.max_ram {
            return Err(PanelError::BadRequest(format!(
                "min_ram ({}) must be > 0 and <= max_ram ({})",
                req.min_ram, req.max_ram
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.registry.servers_dir().join(&id);
        self.installer.prepare_directory(&dir, &req).await?;
        let now = now_ms();
        let server = Server {
            id: id.clone(),
            name: name.to_string(),
            owner: owner.username.clone(),
            members: Vec::new(),
            created_at: now,
            updated_at: now,
            instance: req.instance.clone(),
            size: 0,
            auto_start: req.auto_start,
            min_ram: req.min_ram,
            max_ram: req.max_ram,
            executable: default_executable(req.loader).to_string(),
            minecraft_arguments: String::new(),
            java_arguments: String::new(),
            java_path: req.java_path.clone().filter(|p| !p.trim().is_empty()),
            minecraft_version: req.minecraft_version.trim().to_string(),
            loader_type: req.loader,
            loader_version: req.loader_version.trim().to_string(),
            directory: dir.to_string_lossy().into_owned(),
            port: req.port,
            status: ServerStatus::Offline,
            uptime: 0,
            cpu_usage: 0.0,
            memory_usage: 0,
        };
        let server = self.registry.insert(server).await?;
        tracing::info!(server_id = %id, name = %server.name, loader = server.loader_type.as_str(), mc = %server.minecraft_version, "server created");

        if self.install_jars {
            let this = self.clone();
            let server = server.clone();
            tokio::spawn(async move { this.install_in_background(server).await });
        }
        Ok(server)
    }

    async fn install_in_background(&self, server: Server) {
        let _guard = self.registry.locks().acquire(&server.id).await;
        match self.installer.install(&server).await {
            Ok(executable) => {
                match self
                    .registry
                    .update(&server.id, |s| s.executable = executable.clone())
                    .await
                {
                    Ok(_) => {
                        tracing::info!(server_id = %server.id, executable = %executable, "server jar installed");
                        self.notifications
                            .server_event(
                                &server.id,
                                &server.name,
                                "Server ready",
                                format!("{} {} is installed", server.loader_type.as_str(), server.minecraft_version),
                            )
                            .await;
                    }
                    Err(e) => tracing::warn!(error = %e, server_id = %server.id, "server removed during install"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, server_id = %server.id, operation = "install_server", "server install failed");
                if let Err(e) = self
                    .notifications
                    .push(
                        "Install failed",
                        format!("{}: {}", server.name, e),
                        "panel",
                        SenderType::System,
                        Vec::new(),
                    )
                    .await
                {
                    tracing::warn!(error = %e, "notification failed");
                }
            }
        }
    }

    pub async fn update(&self, id: &str, req: UpdateServerRequest) -> Result<Server> {
        if let (Some(min), Some(max)) = (req.min_ram, req.max_ram)
            && (min == 0 || min > max)
        {
            return Err(PanelError::BadRequest("min_ram must be > 0 and <= max_ram".into()));
        }
        if let Some(name) = &req.name
            && name.trim().is_empty()
        {
            return Err(PanelError::BadRequest("name must be non-empty".into()));
        }
        let server = self
            .registry
            .update(id, |s| {
                if let Some(v) = req.name {
                    s.name = v.trim().to_string();
                }
                if let Some(v) = req.auto_start {
                    s.auto_start = v;
                }
                if let Some(v) = req.min_ram {
                    s.min_ram = v;
                }
                if let Some(v) = req.max_ram {
                    s.max_ram = v;
                }
                if let Some(v) = req.executable {
                    s.executable = v;
                }
                if let Some(v) = req.minecraft_arguments {
                    s.minecraft_arguments = v;
                }
                if let Some(v) = req.java_arguments {
                    s.java_arguments = v;
                }
                if let Some(v) = req.java_path {
                    s.java_path = Some(v).filter(|p| !p.trim().is_empty());
                }
                if let Some(v) = req.members {
                    s.members = v;
                }
                if s.min_ram > s.max_ram {
                    s.max_ram = s.min_ram;
                }
            })
            .await?;
        Ok(server)
    }

    /// Stops the process, then removes backups, registry entry, streams and directory.
    pub async fn delete(&self, user: &UserProfile, id: &str) -> Result<()> {
        let server = self.get_for(user, id).await?;
        if !user.admin && server.owner != user.username {
            return Err(PanelError::Forbidden);
        }
        let _job = self.registry.locks().begin_job(id)?;
        let _guard = self.registry.locks().acquire(id).await;
        self.supervisor.stop_locked(id).await?;
        self.backups.purge(id).await;
        self.registry.remove(id).await?;
        self.supervisor.forget(id);

        let dir = std::path::PathBuf::from(&server.directory);
        if let Some(parent) = dir.parent() {
            let trash = parent.join(format!("{}{}", TRASH_PREFIX, id));
            match tokio::fs::rename(&dir, &trash).await {
                Ok(()) => {
                    if let Err(e) = tokio::fs::remove_dir_all(&trash).await {
                        tracing::warn!(error = %e, server_id = id, "server directory not fully removed");
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(error = %e, server_id = id, "server directory not removed"),
            }
        }
        tracing::info!(server_id = id, name = %server.name, "server deleted");
        Ok(())
    }

    /// Recomputes directory sizes and publishes changes.
    pub async fn refresh_sizes(&self) {
        for server in self.registry.list().await {
            let dir = std::path::PathBuf::from(&server.directory);
            let size = match tokio::task::spawn_blocking(move || crate::files::dir_size(&dir)).await {
                Ok(size) => size,
                Err(e) => {
                    tracing::warn!(error = %e, server_id = %server.id, operation = "dir_size", "size refresh failed");
                    continue;
                }
            };
            if size == server.size {
                continue;
            }
            self.registry
                .update_runtime(&server.id, |s| s.size = size)
                .await;
        }
    }
}
