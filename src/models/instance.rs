// Discoverable modpacks (read-only, from third-party registries)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Platform {
    Modrinth,
    CurseForge,
    AtLauncher,
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverSort {
    #[default]
    Relevance,
    Downloads,
    Likes,
    Newest,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub author: String,
    pub description: String,
    pub downloads: u64,
    pub likes: u64,
    pub last_updated: Option<String>,
    pub published: Option<String>,
    pub platform: Platform,
    pub icon: Option<String>,
    #[serde(default)]
    pub gallery: Vec<String>,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub project_url: Option<String>,
}

fn default_limit() -> u32 {
    20
}

/// Query of `GET /api/instances/discover`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub sort: DiscoverSort,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Default for DiscoverQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            sort: DiscoverSort::default(),
            platform: Platform::default(),
            limit: default_limit(),
            offset: 0,
        }
    }
}
