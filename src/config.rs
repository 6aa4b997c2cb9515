use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub broadcaster: BroadcasterConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub backups: BackupsConfig,
    #[serde(default)]
    pub java: JavaConfig,
    #[serde(default)]
    pub minecraft: MinecraftConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Everything lives under `data_dir`: servers/, backups/, java/ and the SQLite database.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/panel.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn servers_dir(&self) -> PathBuf {
        self.data_dir.join("servers")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn java_dir(&self) -> PathBuf {
        self.data_dir.join("java")
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("panel.db"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Seconds to wait after sending `stop` before the process is killed.
    pub stop_grace_secs: u64,
    /// Console lines kept per server; oldest lines are evicted first.
    pub log_buffer_lines: usize,
    /// Java binary used when a server has no explicit java_path.
    pub default_java_path: String,
    /// Start servers flagged auto_start when the panel boots.
    pub auto_start: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stop_grace_secs: 30,
            log_buffer_lines: 2000,
            default_java_path: "java".into(),
            auto_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BroadcasterConfig {
    /// Max state events buffered per server channel (slow subscribers get a resync).
    pub channel_capacity: usize,
    pub ping_interval_secs: u64,
    /// Subscribers not polled for this long are dropped.
    pub idle_timeout_secs: u64,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            ping_interval_secs: 15,
            idle_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub sample_interval_ms: u64,
    /// How often to log app stats (running servers, state subscribers) at INFO level.
    pub stats_log_interval_secs: u64,
    /// How often server directory sizes are recomputed.
    pub size_refresh_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 2000,
            stats_log_interval_secs: 300,
            size_refresh_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupsConfig {
    /// Retention slots for servers without explicit settings.
    pub default_slots: u32,
    /// Max seconds to wait for the server to confirm `save-all flush`.
    pub save_timeout_secs: u64,
    /// Relative path prefixes never archived.
    pub default_exclusions: Vec<String>,
}

impl Default for BackupsConfig {
    fn default() -> Self {
        Self {
            default_slots: 5,
            save_timeout_secs: 60,
            default_exclusions: vec![
                "logs".into(),
                "cache".into(),
                "crash-reports".into(),
                "plugins/WorldEdit/sessions".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JavaConfig {
    pub manifest_url: String,
    pub download_concurrency: usize,
}

impl Default for JavaConfig {
    fn default() -> Self {
        Self {
            manifest_url: "https://launchermeta.mojang.com/v1/products/java-runtime/2ec0cc96c44e5a76b9c8b7c39df7210883d12871/all.json".into(),
            download_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MinecraftConfig {
    pub version_manifest_url: String,
    pub fabric_meta_url: String,
    pub quilt_meta_url: String,
    pub forge_maven_url: String,
    pub neoforge_maven_url: String,
    /// Download jars / run loader installers when a server is created.
    pub install_server_jars: bool,
    pub cache_ttl_secs: u64,
}

impl Default for MinecraftConfig {
    fn default() -> Self {
        Self {
            version_manifest_url:
                "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json".into(),
            fabric_meta_url: "https://meta.fabricmc.net/v2".into(),
            quilt_meta_url: "https://meta.quiltmc.org/v3".into(),
            forge_maven_url: "https://maven.minecraftforge.net".into(),
            neoforge_maven_url: "https://maven.neoforged.net".into(),
            install_server_jars: true,
            cache_ttl_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub modrinth_url: String,
    pub curseforge_url: String,
    /// CurseForge is skipped when unset.
    pub curseforge_api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            modrinth_url: "https://api.modrinth.com/v2".into(),
            curseforge_url: "https://api.curseforge.com/v1".into(),
            curseforge_api_key: None,
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When false every request runs as an anonymous admin (local-only setups, tests).
    pub enabled: bool,
    pub token_ttl_hours: u64,
    pub remember_days: u64,
    pub bootstrap_user: String,
    /// Admin account created on first boot when no users exist.
    pub bootstrap_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_ttl_hours: 24,
            remember_days: 30,
            bootstrap_user: "admin".into(),
            bootstrap_password: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.storage.data_dir.as_os_str().is_empty(),
            "storage.data_dir must be non-empty"
        );
        anyhow::ensure!(
            self.supervisor.stop_grace_secs > 0,
            "supervisor.stop_grace_secs must be > 0, got {}",
            self.supervisor.stop_grace_secs
        );
        anyhow::ensure!(
            self.supervisor.log_buffer_lines > 0,
            "supervisor.log_buffer_lines must be > 0, got {}",
            self.supervisor.log_buffer_lines
        );
        anyhow::ensure!(
            !self.supervisor.default_java_path.is_empty(),
            "supervisor.default_java_path must be non-empty"
        );
        anyhow::ensure!(
            self.broadcaster.channel_capacity > 0,
            "broadcaster.channel_capacity must be > 0, got {}",
            self.broadcaster.channel_capacity
        );
        anyhow::ensure!(
            self.broadcaster.ping_interval_secs > 0,
            "broadcaster.ping_interval_secs must be > 0, got {}",
            self.broadcaster.ping_interval_secs
        );
        anyhow::ensure!(
            self.broadcaster.idle_timeout_secs > self.broadcaster.ping_interval_secs,
            "broadcaster.idle_timeout_secs must be greater than ping_interval_secs, got {}",
            self.broadcaster.idle_timeout_secs
        );
        anyhow::ensure!(
            self.monitoring.sample_interval_ms > 0,
            "monitoring.sample_interval_ms must be > 0, got {}",
            self.monitoring.sample_interval_ms
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.size_refresh_interval_secs > 0,
            "monitoring.size_refresh_interval_secs must be > 0, got {}",
            self.monitoring.size_refresh_interval_secs
        );
        anyhow::ensure!(
            self.backups.default_slots > 0,
            "backups.default_slots must be > 0, got {}",
            self.backups.default_slots
        );
        anyhow::ensure!(
            self.backups.save_timeout_secs > 0,
            "backups.save_timeout_secs must be > 0, got {}",
            self.backups.save_timeout_secs
        );
        anyhow::ensure!(
            self.java.download_concurrency > 0,
            "java.download_concurrency must be > 0, got {}",
            self.java.download_concurrency
        );
        anyhow::ensure!(
            self.discovery.request_timeout_secs > 0,
            "discovery.request_timeout_secs must be > 0, got {}",
            self.discovery.request_timeout_secs
        );
        anyhow::ensure!(
            self.auth.token_ttl_hours > 0,
            "auth.token_ttl_hours must be > 0, got {}",
            self.auth.token_ttl_hours
        );
        anyhow::ensure!(
            !self.auth.bootstrap_user.is_empty(),
            "auth.bootstrap_user must be non-empty"
        );
        Ok(())
    }
}
