// Server records and their runtime state

use serde::{Deserialize, Serialize};

/// Lifecycle status; serialized as-is ("Running", "Offline", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ServerStatus {
    Running,
    #[default]
    Offline,
    Restarting,
    Crashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LoaderType {
    #[default]
    Vanilla,
    Fabric,
    Quilt,
    Forge,
    NeoForge,
}

impl LoaderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderType::Vanilla => "Vanilla",
            LoaderType::Fabric => "Fabric",
            LoaderType::Quilt => "Quilt",
            LoaderType::Forge => "Forge",
            LoaderType::NeoForge => "NeoForge",
        }
    }

    /// Case-insensitive parse of a loader name from a URL or form field.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vanilla" => Some(LoaderType::Vanilla),
            "fabric" => Some(LoaderType::Fabric),
            "quilt" => Some(LoaderType::Quilt),
            "forge" => Some(LoaderType::Forge),
            "neoforge" => Some(LoaderType::NeoForge),
            _ => None,
        }
    }

    pub const ALL: [LoaderType; 5] = [
        LoaderType::Vanilla,
        LoaderType::Fabric,
        LoaderType::Quilt,
        LoaderType::Forge,
        LoaderType::NeoForge,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub members: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub instance: Option<String>,
    /// Directory size in bytes (refreshed periodically).
    #[serde(default)]
    pub size: u64,
    pub auto_start: bool,
    pub min_ram: u32,
    pub max_ram: u32,
    /// Jar relative to the server directory, or an `@args-file` for installer-based loaders.
    pub executable: String,
    #[serde(default)]
    pub minecraft_arguments: String,
    #[serde(default)]
    pub java_arguments: String,
    #[serde(default)]
    pub java_path: Option<String>,
    pub minecraft_version: String,
    pub loader_type: LoaderType,
    #[serde(default)]
    pub loader_version: String,
    pub directory: String,
    pub port: u16,
    #[serde(default)]
    pub status: ServerStatus,
    /// Seconds since the current process started; 0 when not running.
    #[serde(default)]
    pub uptime: u64,
    #[serde(default)]
    pub cpu_usage: f32,
    #[serde(default)]
    pub memory_usage: u64,
}

impl Server {
    pub fn is_visible_to(&self, username: &str, admin: bool) -> bool {
        admin || self.owner == username || self.members.iter().any(|m| m == username)
    }

    /// Clear runtime-only fields (process exited or never started).
    pub fn reset_runtime(&mut self, status: ServerStatus) {
        self.status = status;
        self.uptime = 0;
        self.cpu_usage = 0.0;
        self.memory_usage = 0;
    }
}

fn default_difficulty() -> String {
    "easy".into()
}

fn default_gamemode() -> String {
    "survival".into()
}

fn default_max_players() -> u32 {
    20
}

fn default_port() -> u16 {
    25565
}

fn default_min_ram() -> u32 {
    1024
}

fn default_max_ram() -> u32 {
    2048
}

/// Body of `POST /api/server`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default = "default_gamemode")]
    pub gamemode: String,
    #[serde(default)]
    pub hardcore: bool,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    pub minecraft_version: String,
    #[serde(default)]
    pub loader: LoaderType,
    #[serde(default)]
    pub loader_version: String,
    #[serde(default)]
    pub java_path: Option<String>,
    #[serde(default = "default_min_ram")]
    pub min_ram: u32,
    #[serde(default = "default_max_ram")]
    pub max_ram: u32,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub instance: Option<String>,
}

/// Body of `PATCH /api/server/{id}`; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateServerRequest {
    pub name: Option<String>,
    pub auto_start: Option<bool>,
    pub min_ram: Option<u32>,
    pub max_ram: Option<u32>,
    pub executable: Option<String>,
    pub minecraft_arguments: Option<String>,
    pub java_arguments: Option<String>,
    pub java_path: Option<String>,
    pub members: Option<Vec<String>>,
}

/// Body of `POST /api/server/{id}/console`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleCommand {
    pub command: String,
}
