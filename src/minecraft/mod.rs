// Minecraft version manifest and mod loader metadata.

pub mod install;
mod loaders;

pub use install::ServerInstaller;

use crate::config::MinecraftConfig;
use crate::error::{PanelError, Result};
use crate::models::LoaderType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinecraftVersion {
    pub id: String,
    /// "release", "snapshot", "old_beta" or "old_alpha".
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub release_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManifest {
    pub latest: LatestVersions,
    pub versions: Vec<MinecraftVersion>,
}

#[derive(Debug, Deserialize)]
struct VersionDetails {
    downloads: HashMap<String, DownloadRef>,
}

#[derive(Debug, Deserialize)]
struct DownloadRef {
    url: String,
}

pub struct MinecraftService {
    client: reqwest::Client,
    config: MinecraftConfig,
    manifest: Mutex<Option<(Instant, VersionManifest)>>,
}

impl MinecraftService {
    pub fn new(client: reqwest::Client, config: MinecraftConfig) -> Self {
        Self {
            client,
            config,
            manifest: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MinecraftConfig {
        &self.config
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        Ok(self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await?)
    }

    /// Version manifest, cached for `cache_ttl_secs`.
    pub async fn manifest(&self) -> Result<VersionManifest> {
        let mut cached = self.manifest.lock().await;
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        if let Some((fetched, manifest)) = cached.as_ref()
            && fetched.elapsed() < ttl
        {
            return Ok(manifest.clone());
        }
        let manifest: VersionManifest = self.get_json(&self.config.version_manifest_url).await?;
        tracing::debug!(versions = manifest.versions.len(), "minecraft version manifest refreshed");
        *cached = Some((Instant::now(), manifest.clone()));
        Ok(manifest)
    }

    pub async fn versions(&self) -> Result<Vec<MinecraftVersion>> {
        Ok(self.manifest().await?.versions)
    }

    pub async fn releases(&self) -> Result<Vec<MinecraftVersion>> {
        self.filtered("release").await
    }

    pub async fn snapshots(&self) -> Result<Vec<MinecraftVersion>> {
        self.filtered("snapshot").await
    }

    async fn filtered(&self, kind: &str) -> Result<Vec<MinecraftVersion>> {
        Ok(self
            .versions()
            .await?
            .into_iter()
            .filter(|v| v.kind == kind)
            .collect())
    }

    /// Loader versions published for a Minecraft version, newest first. Vanilla has none.
    pub async fn loader_versions(&self, loader: LoaderType, mc: &str) -> Result<Vec<String>> {
        let versions = match loader {
            LoaderType::Vanilla => Vec::new(),
            LoaderType::Fabric => loaders::meta_versions(
                self.get_json(&format!("{}/versions/loader/{}", self.config.fabric_meta_url, mc))
                    .await?,
            ),
            LoaderType::Quilt => loaders::meta_versions(
                self.get_json(&format!("{}/versions/loader/{}", self.config.quilt_meta_url, mc))
                    .await?,
            ),
            LoaderType::Forge => {
                let metadata: HashMap<String, Vec<String>> = self
                    .get_json(&format!(
                        "{}/net/minecraftforge/forge/maven-metadata.json",
                        self.config.forge_maven_url
                    ))
                    .await?;
                loaders::forge_versions(&metadata, mc)
            }
            LoaderType::NeoForge => {
                let all: loaders::NeoForgeVersions = self
                    .get_json(&format!(
                        "{}/api/maven/versions/releases/net/neoforged/neoforge",
                        self.config.neoforge_maven_url
                    ))
                    .await?;
                loaders::neoforge_versions(&all, mc)
            }
        };
        Ok(versions)
    }

    /// Vanilla always; other loaders when they publish versions for `mc`. Forge and NeoForge
    /// never build for snapshots.
    pub async fn supported_loaders(&self, mc: &str, snapshot: bool) -> Vec<LoaderType> {
        let mut out = vec![LoaderType::Vanilla];
        for loader in LoaderType::ALL {
            if loader == LoaderType::Vanilla
                || (snapshot && matches!(loader, LoaderType::Forge | LoaderType::NeoForge))
            {
                continue;
            }
            match self.loader_versions(loader, mc).await {
                Ok(versions) if !versions.is_empty() => out.push(loader),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, loader = loader.as_str(), mc, "loader lookup failed");
                }
            }
        }
        out
    }

    /// Download URL of the vanilla server jar.
    pub async fn server_jar_url(&self, mc: &str) -> Result<String> {
        let manifest = self.manifest().await?;
        let version = manifest
            .versions
            .iter()
            .find(|v| v.id == mc)
            .ok_or_else(|| PanelError::NotFound(format!("minecraft version {}", mc)))?;
        let details: VersionDetails = self.get_json(&version.url).await?;
        details
            .downloads
            .get("server")
            .map(|d| d.url.clone())
            .ok_or_else(|| PanelError::InstallFailed(format!("{} has no server download", mc)))
    }

    /// Latest stable Fabric installer version.
    pub(crate) async fn fabric_installer(&self) -> Result<String> {
        let installers: Vec<loaders::MetaInstaller> = self
            .get_json(&format!("{}/versions/installer", self.config.fabric_meta_url))
            .await?;
        installers
            .iter()
            .find(|i| i.stable)
            .or_else(|| installers.first())
            .map(|i| i.version.clone())
            .ok_or_else(|| PanelError::InstallFailed("no fabric installer published".into()))
    }

    /// Newest loader version when none was chosen.
    pub(crate) async fn resolve_loader_version(&self, loader: LoaderType, mc: &str, requested: &str) -> Result<String> {
        if !requested.trim().is_empty() || loader == LoaderType::Vanilla {
            return Ok(requested.trim().to_string());
        }
        self.loader_versions(loader, mc)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                PanelError::InstallFailed(format!("{} has no versions for {}", loader.as_str(), mc))
            })
    }
}
