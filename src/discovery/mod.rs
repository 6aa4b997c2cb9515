// Modpack discovery across third-party registries, with cooperative cancellation.
// A search finishing after its token was cancelled is discarded.

mod curseforge;
mod modrinth;

pub use curseforge::CurseForgeProvider;
pub use modrinth::ModrinthProvider;

use crate::error::{PanelError, Result};
use crate::models::{DiscoverQuery, DiscoverSort, Instance, Platform};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait InstanceProvider: Send + Sync {
    fn platform(&self) -> Platform;

    async fn search(&self, query: &DiscoverQuery) -> Result<Vec<Instance>>;
}

pub struct DiscoveryClient {
    providers: Vec<Arc<dyn InstanceProvider>>,
}

impl DiscoveryClient {
    pub fn new(providers: Vec<Arc<dyn InstanceProvider>>) -> Self {
        Self { providers }
    }

    /// Modrinth always; CurseForge only with an API key.
    pub fn from_config(client: reqwest::Client, config: &crate::config::DiscoveryConfig) -> Self {
        let mut providers: Vec<Arc<dyn InstanceProvider>> = vec![Arc::new(ModrinthProvider::new(
            client.clone(),
            config.modrinth_url.clone(),
        ))];
        match config.curseforge_api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => providers.push(Arc::new(CurseForgeProvider::new(
                client,
                config.curseforge_url.clone(),
                key,
            ))),
            None => tracing::info!("no CurseForge API key configured, CurseForge search disabled"),
        }
        Self::new(providers)
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.providers.iter().map(|p| p.platform()).collect()
    }

    pub async fn search(&self, query: &DiscoverQuery, cancel: &CancellationToken) -> Result<Vec<Instance>> {
        let selected: Vec<&Arc<dyn InstanceProvider>> = self
            .providers
            .iter()
            .filter(|p| query.platform == Platform::All || p.platform() == query.platform)
            .collect();
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let searches = futures_util::future::join_all(selected.iter().map(|p| p.search(query)));
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PanelError::Cancelled),
            results = searches => results,
        };
        if cancel.is_cancelled() {
            return Err(PanelError::Cancelled);
        }

        let mut lists = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (provider, result) in selected.iter().zip(results) {
            match result {
                Ok(list) => lists.push(list),
                Err(e) => {
                    tracing::warn!(error = %e, platform = ?provider.platform(), operation = "discover", "provider search failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if lists.is_empty()
            && let Some(e) = first_error
        {
            return Err(e);
        }
        Ok(merge(lists, query.sort, query.limit as usize))
    }
}

/// Merges per-platform pages. Relevance interleaves the platforms' own rankings; the
/// other orders sort on the shared field. Truncated to `limit`.
pub fn merge(lists: Vec<Vec<Instance>>, sort: DiscoverSort, limit: usize) -> Vec<Instance> {
    let mut merged: Vec<Instance> = match sort {
        DiscoverSort::Relevance => {
            let mut iters: Vec<_> = lists.into_iter().map(|l| l.into_iter()).collect();
            let mut out = Vec::new();
            loop {
                let mut progressed = false;
                for it in iters.iter_mut() {
                    if let Some(item) = it.next() {
                        out.push(item);
                        progressed = true;
                    }
                }
                if !progressed {
                    break out;
                }
            }
        }
        _ => lists.into_iter().flatten().collect(),
    };
    match sort {
        DiscoverSort::Relevance => {}
        DiscoverSort::Downloads => merged.sort_by(|a, b| b.downloads.cmp(&a.downloads)),
        DiscoverSort::Likes => merged.sort_by(|a, b| b.likes.cmp(&a.likes)),
        DiscoverSort::Newest => merged.sort_by(|a, b| b.published.cmp(&a.published)),
        DiscoverSort::Updated => merged.sort_by(|a, b| b.last_updated.cmp(&a.last_updated)),
    }
    merged.truncate(limit.max(1));
    merged
}
