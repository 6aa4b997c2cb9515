// Modrinth v2 search, restricted to modpacks.

use super::InstanceProvider;
use crate::error::Result;
use crate::models::{DiscoverQuery, DiscoverSort, Instance, Platform};
use async_trait::async_trait;
use serde::Deserialize;

pub struct ModrinthProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    project_id: String,
    #[serde(default)]
    slug: Option<String>,
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    downloads: u64,
    #[serde(default)]
    follows: u64,
    #[serde(default)]
    icon_url: Option<String>,
    #[serde(default)]
    gallery: Vec<String>,
    #[serde(default)]
    versions: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    date_created: Option<String>,
    #[serde(default)]
    date_modified: Option<String>,
    #[serde(default)]
    latest_version: Option<String>,
}

impl ModrinthProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

fn sort_index(sort: DiscoverSort) -> &'static str {
    match sort {
        DiscoverSort::Relevance => "relevance",
        DiscoverSort::Downloads => "downloads",
        DiscoverSort::Likes => "follows",
        DiscoverSort::Newest => "newest",
        DiscoverSort::Updated => "updated",
    }
}

impl From<Hit> for Instance {
    fn from(hit: Hit) -> Self {
        let project_url = Some(format!(
            "https://modrinth.com/modpack/{}",
            hit.slug.as_deref().unwrap_or(&hit.project_id)
        ));
        Instance {
            id: hit.project_id,
            name: hit.title,
            author: hit.author,
            description: hit.description,
            downloads: hit.downloads,
            likes: hit.follows,
            last_updated: hit.date_modified,
            published: hit.date_created,
            platform: Platform::Modrinth,
            icon: hit.icon_url.filter(|u| !u.is_empty()),
            gallery: hit.gallery,
            versions: hit.latest_version.into_iter().collect(),
            game_versions: hit.versions,
            categories: hit.categories,
            project_url,
        }
    }
}

#[async_trait]
impl InstanceProvider for ModrinthProvider {
    fn platform(&self) -> Platform {
        Platform::Modrinth
    }

    async fn search(&self, query: &DiscoverQuery) -> Result<Vec<Instance>> {
        let limit = query.limit.clamp(1, 100).to_string();
        let offset = query.offset.to_string();
        let response: SearchResponse = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("query", query.search.as_str()),
                ("facets", r#"[["project_type:modpack"]]"#),
                ("index", sort_index(query.sort)),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.hits.into_iter().map(Instance::from).collect())
    }
}
