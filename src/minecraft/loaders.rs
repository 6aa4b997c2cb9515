// Response shapes and parsing for loader metadata (Fabric, Quilt, Forge, NeoForge).

use serde::Deserialize;
use std::collections::HashMap;

/// Entry of `/versions/loader/{mc}` on the Fabric and Quilt meta APIs.
#[derive(Debug, Deserialize)]
pub struct MetaLoaderEntry {
    pub loader: MetaLoader,
}

#[derive(Debug, Deserialize)]
pub struct MetaLoader {
    pub version: String,
    /// Quilt omits it; those entries count as stable.
    #[serde(default)]
    pub stable: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MetaInstaller {
    pub version: String,
    #[serde(default)]
    pub stable: bool,
}

/// Fabric/Quilt: stable releases first, each group newest first as served.
pub fn meta_versions(mut entries: Vec<MetaLoaderEntry>) -> Vec<String> {
    entries.sort_by_key(|e| !e.loader.stable.unwrap_or(true));
    entries.into_iter().map(|e| e.loader.version).collect()
}

/// Forge `maven-metadata.json` maps a Minecraft version to `"{mc}-{forge}"` entries, oldest
/// first. Returns the Forge versions newest first.
pub fn forge_versions(metadata: &HashMap<String, Vec<String>>, mc: &str) -> Vec<String> {
    let prefix = format!("{}-", mc);
    metadata
        .get(mc)
        .map(|list| {
            list.iter()
                .rev()
                .map(|v| v.strip_prefix(&prefix).unwrap_or(v).to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// NeoForge versions drop the leading `1.`: Minecraft 1.20.4 maps to `20.4.*`,
/// 1.21 to `21.0.*`. None for versions NeoForge never targeted.
pub fn neoforge_prefix(mc: &str) -> Option<String> {
    let rest = mc.strip_prefix("1.")?;
    let mut parts = rest.split('.');
    let minor = parts.next()?.parse::<u32>().ok()?;
    let patch = parts.next().map(|p| p.parse::<u32>().ok()).unwrap_or(Some(0))?;
    if minor < 20 {
        return None;
    }
    Some(format!("{}.{}.", minor, patch))
}

#[derive(Debug, Deserialize)]
pub struct NeoForgeVersions {
    pub versions: Vec<String>,
}

/// NeoForge versions for `mc`, newest first.
pub fn neoforge_versions(all: &NeoForgeVersions, mc: &str) -> Vec<String> {
    let Some(prefix) = neoforge_prefix(mc) else {
        return Vec::new();
    };
    all.versions
        .iter()
        .rev()
        .filter(|v| v.starts_with(&prefix))
        .cloned()
        .collect()
}
