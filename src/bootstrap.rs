// Wires the services together from config. Shared by main and the integration tests.

use crate::auth::AuthService;
use crate::backup::{BackupDefaults, BackupEngine};
use crate::broadcaster::{BroadcasterSettings, StateBroadcaster};
use crate::config::AppConfig;
use crate::discovery::DiscoveryClient;
use crate::files::FileGateway;
use crate::java::{JavaInstaller, JavaSettings};
use crate::minecraft::{MinecraftService, ServerInstaller};
use crate::notifications::NotificationCenter;
use crate::registry::ServerRegistry;
use crate::routes::AppState;
use crate::servers::ServerService;
use crate::store::Store;
use crate::supervisor::{ProcessStats, Supervisor, SupervisorSettings};
use crate::version::USER_AGENT;
use std::sync::Arc;
use std::time::Duration;

fn http_client(timeout: Option<Duration>) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Creates the data directories, opens the database and builds every service.
pub async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let storage = &config.storage;
    for dir in [storage.servers_dir(), storage.backups_dir(), storage.java_dir()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| anyhow::anyhow!("create {}: {}", dir.display(), e))?;
    }

    let store = Arc::new(Store::connect(&storage.database_path()).await?);
    store.init().await?;

    let broadcaster = StateBroadcaster::new(BroadcasterSettings::from(&config.broadcaster));
    let registry = Arc::new(
        ServerRegistry::load(store.clone(), broadcaster.clone(), storage.servers_dir()).await?,
    );
    let notifications = NotificationCenter::load(store.clone()).await?;

    let supervisor = Supervisor::new(
        registry.clone(),
        notifications.clone(),
        SupervisorSettings::from(&config.supervisor),
    );
    let backups = BackupEngine::new(
        store.clone(),
        registry.clone(),
        supervisor.clone(),
        notifications.clone(),
        storage.backups_dir(),
        BackupDefaults::from(&config.backups),
    );

    // Downloads (jars, runtimes) can run for minutes; only the search client gets a timeout.
    let client = http_client(None)?;
    let search_client = http_client(Some(Duration::from_secs(
        config.discovery.request_timeout_secs,
    )))?;

    let minecraft = Arc::new(MinecraftService::new(client.clone(), config.minecraft.clone()));
    let installer = Arc::new(ServerInstaller::new(
        minecraft.clone(),
        config.supervisor.default_java_path.clone(),
    ));
    let servers = ServerService::new(
        registry.clone(),
        supervisor.clone(),
        backups.clone(),
        notifications.clone(),
        installer,
        config.minecraft.install_server_jars,
    );
    let java = JavaInstaller::new(client, storage.java_dir(), JavaSettings::from(&config.java));
    let discovery = Arc::new(DiscoveryClient::from_config(search_client, &config.discovery));
    let files = Arc::new(FileGateway::new(registry.clone()));

    let auth = Arc::new(AuthService::new(store.clone(), config.auth.clone()));
    auth.bootstrap().await?;

    tracing::info!(
        servers = registry.list().await.len(),
        data_dir = %storage.data_dir.display(),
        discovery = ?discovery.platforms(),
        "state loaded"
    );

    Ok(AppState {
        config: Arc::new(config.clone()),
        store,
        registry,
        broadcaster,
        supervisor,
        backups,
        servers,
        files,
        java,
        minecraft,
        discovery,
        notifications,
        auth,
        stats: Arc::new(ProcessStats::new()),
    })
}
