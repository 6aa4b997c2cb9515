// Mojang java-runtime manifests: the per-platform index (all.json) and per-runtime file lists.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// all.json: platform -> runtime -> entries (the first entry is current).
pub type RuntimeIndex = HashMap<String, HashMap<String, Vec<RuntimeEntry>>>;

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeEntry {
    pub manifest: Download,
    pub version: RuntimeVersion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeVersion {
    pub name: String,
    #[serde(default)]
    pub released: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Download {
    pub url: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeManifest {
    pub files: BTreeMap<String, RuntimeFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuntimeFile {
    File {
        #[serde(default)]
        executable: bool,
        downloads: FileDownloads,
    },
    Directory,
    Link {
        target: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileDownloads {
    pub raw: Download,
}

/// Platform key of the running host in all.json.
pub fn platform_key() -> &'static str {
    if cfg!(target_os = "windows") {
        if cfg!(target_arch = "x86") {
            "windows-x86"
        } else if cfg!(target_arch = "aarch64") {
            "windows-arm64"
        } else {
            "windows-x64"
        }
    } else if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            "mac-os-arm64"
        } else {
            "mac-os"
        }
    } else if cfg!(target_arch = "x86") {
        "linux-i386"
    } else {
        "linux"
    }
}

/// Human OS label reported with each runtime.
pub fn operating_system() -> &'static str {
    std::env::consts::OS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_runtime_manifest() {
        let json = r#"{"files": {
            "bin": {"type": "directory"},
            "bin/java": {"type": "file", "executable": true,
                "downloads": {"raw": {"sha1": "ab", "size": 12, "url": "https://x/java"}}},
            "lib/libjli.so": {"type": "link", "target": "../jli/libjli.so"}
        }}"#;
        let manifest: RuntimeManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.files.len(), 3);
        match &manifest.files["bin/java"] {
            RuntimeFile::File {
                executable,
                downloads,
            } => {
                assert!(*executable);
                assert_eq!(downloads.raw.size, Some(12));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_index() {
        let json = r#"{"linux": {"java-runtime-gamma": [{
            "availability": {"group": 1, "progress": 100},
            "manifest": {"sha1": "x", "size": 1, "url": "https://x/m.json"},
            "version": {"name": "17.0.8", "released": "2023-08-01T00:00:00+00:00"}}],
            "jre-legacy": []}}"#;
        let index: RuntimeIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index["linux"]["java-runtime-gamma"][0].version.name, "17.0.8");
    }
}
