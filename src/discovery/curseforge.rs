// CurseForge v1 search for Minecraft modpacks. Needs an API key.

use super::InstanceProvider;
use crate::error::Result;
use crate::models::{DiscoverQuery, DiscoverSort, Instance, Platform};
use async_trait::async_trait;
use serde::Deserialize;

const MINECRAFT_GAME_ID: &str = "432";
const MODPACK_CLASS_ID: &str = "4471";

pub struct CurseForgeProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Vec<Mod>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Mod {
    id: u64,
    name: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    download_count: f64,
    #[serde(default)]
    thumbs_up_count: u64,
    #[serde(default)]
    date_created: Option<String>,
    #[serde(default)]
    date_modified: Option<String>,
    #[serde(default)]
    logo: Option<Asset>,
    #[serde(default)]
    screenshots: Vec<Asset>,
    #[serde(default)]
    authors: Vec<Named>,
    #[serde(default)]
    categories: Vec<Named>,
    #[serde(default)]
    latest_files_indexes: Vec<FileIndex>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Asset {
    #[serde(default)]
    thumbnail_url: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileIndex {
    game_version: String,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Links {
    #[serde(default)]
    website_url: Option<String>,
}

impl CurseForgeProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

/// `sortField` values of the CurseForge API.
fn sort_field(sort: DiscoverSort) -> &'static str {
    match sort {
        DiscoverSort::Relevance => "1",
        DiscoverSort::Downloads => "6",
        DiscoverSort::Likes => "12",
        DiscoverSort::Newest => "11",
        DiscoverSort::Updated => "3",
    }
}

impl From<Mod> for Instance {
    fn from(m: Mod) -> Self {
        let mut game_versions: Vec<String> = Vec::new();
        let mut versions: Vec<String> = Vec::new();
        for index in m.latest_files_indexes {
            if !game_versions.contains(&index.game_version) {
                game_versions.push(index.game_version);
            }
            if let Some(name) = index.filename
                && !versions.contains(&name)
            {
                versions.push(name);
            }
        }
        Instance {
            id: m.id.to_string(),
            name: m.name,
            author: m
                .authors
                .into_iter()
                .map(|a| a.name)
                .collect::<Vec<_>>()
                .join(", "),
            description: m.summary,
            downloads: m.download_count.max(0.0) as u64,
            likes: m.thumbs_up_count,
            last_updated: m.date_modified,
            published: m.date_created,
            platform: Platform::CurseForge,
            icon: m.logo.map(|l| l.thumbnail_url.unwrap_or(l.url)),
            gallery: m.screenshots.into_iter().map(|s| s.url).collect(),
            versions,
            game_versions,
            categories: m.categories.into_iter().map(|c| c.name).collect(),
            project_url: m.links.and_then(|l| l.website_url),
        }
    }
}

#[async_trait]
impl InstanceProvider for CurseForgeProvider {
    fn platform(&self) -> Platform {
        Platform::CurseForge
    }

    async fn search(&self, query: &DiscoverQuery) -> Result<Vec<Instance>> {
        let page_size = query.limit.clamp(1, 50).to_string();
        let index = query.offset.to_string();
        let response: SearchResponse = self
            .client
            .get(format!("{}/mods/search", self.base_url))
            .header("x-api-key", &self.api_key)
            .query(&[
                ("gameId", MINECRAFT_GAME_ID),
                ("classId", MODPACK_CLASS_ID),
                ("searchFilter", query.search.as_str()),
                ("sortField", sort_field(query.sort)),
                ("sortOrder", "desc"),
                ("pageSize", page_size.as_str()),
                ("index", index.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.data.into_iter().map(Instance::from).collect())
    }
}
