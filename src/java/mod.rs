// Java runtime installer backed by the Mojang java-runtime manifests.
// Installs download into a hidden `.<runtime>.partial` directory that is renamed into place
// only after every file arrived; uninstall renames to a trash name before removing.

mod manifest;

pub use manifest::{RuntimeFile, RuntimeIndex, RuntimeManifest, operating_system, platform_key};

use crate::error::{PanelError, Result};
use crate::models::{InstallEvent, InstallProgress, JavaVersion};
use futures_util::{StreamExt, stream};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

const VERSION_MARKER: &str = ".version";
const EVENT_QUEUE: usize = 256;

#[derive(Debug, Clone)]
pub struct JavaSettings {
    pub manifest_url: String,
    pub download_concurrency: usize,
}

impl From<&crate::config::JavaConfig> for JavaSettings {
    fn from(c: &crate::config::JavaConfig) -> Self {
        Self {
            manifest_url: c.manifest_url.clone(),
            download_concurrency: c.download_concurrency,
        }
    }
}

pub struct JavaInstaller {
    client: reqwest::Client,
    java_dir: PathBuf,
    settings: JavaSettings,
    installing: Arc<Mutex<HashSet<String>>>,
}

/// Clears the in-progress flag when the install task ends.
struct InstallSlot {
    runtime: String,
    installing: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InstallSlot {
    fn drop(&mut self) {
        self.installing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.runtime);
    }
}

/// Runtime ids look like `java-runtime-gamma` or `jre-legacy`.
pub fn validate_runtime(runtime: &str) -> Result<()> {
    let ok = !runtime.is_empty()
        && runtime.len() <= 64
        && runtime
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !runtime.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(PanelError::BadRequest(format!("invalid runtime: {}", runtime)))
    }
}

impl JavaInstaller {
    pub fn new(client: reqwest::Client, java_dir: PathBuf, settings: JavaSettings) -> Arc<Self> {
        Arc::new(Self {
            client,
            java_dir,
            settings,
            installing: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn runtime_dir(&self, runtime: &str) -> PathBuf {
        self.java_dir.join(runtime)
    }

    /// Path of the `java` binary inside an installed runtime.
    pub fn executable(&self, runtime: &str) -> PathBuf {
        let dir = self.runtime_dir(runtime);
        if cfg!(target_os = "macos") {
            dir.join("jre.bundle/Contents/Home/bin/java")
        } else if cfg!(target_os = "windows") {
            dir.join("bin/java.exe")
        } else {
            dir.join("bin/java")
        }
    }

    pub fn is_installed(&self, runtime: &str) -> bool {
        self.runtime_dir(runtime).join(VERSION_MARKER).is_file()
    }

    pub fn is_installing(&self, runtime: &str) -> bool {
        self.installing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(runtime)
    }

    async fn fetch_index(&self) -> Result<RuntimeIndex> {
        let index = self
            .client
            .get(&self.settings.manifest_url)
            .send()
            .await?
            .error_for_status()?
            .json::<RuntimeIndex>()
            .await?;
        Ok(index)
    }

    fn java_version(&self, runtime: &str, version: String) -> JavaVersion {
        let installed = self.is_installed(runtime);
        JavaVersion {
            version,
            runtime: runtime.to_string(),
            operating_system: operating_system().to_string(),
            installed,
            executable: installed.then(|| self.executable(runtime)),
        }
    }

    /// Runtimes published for this platform, plus local installs the manifest no longer lists.
    /// Falls back to local installs when the manifest is unreachable.
    pub async fn versions(&self) -> Result<Vec<JavaVersion>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        match self.fetch_index().await {
            Ok(index) => {
                if let Some(runtimes) = index.get(platform_key()) {
                    for (runtime, entries) in runtimes {
                        let Some(entry) = entries.first() else {
                            continue;
                        };
                        seen.insert(runtime.clone());
                        out.push(self.java_version(runtime, entry.version.name.clone()));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = "fetch_java_index", "java runtime manifest unavailable, listing local installs");
            }
        }
        for (runtime, version) in self.local_installs().await? {
            if !seen.contains(&runtime) {
                out.push(self.java_version(&runtime, version));
            }
        }
        out.sort_by(|a, b| a.runtime.cmp(&b.runtime));
        Ok(out)
    }

    async fn local_installs(&self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.java_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if let Ok(version) = tokio::fs::read_to_string(entry.path().join(VERSION_MARKER)).await {
                out.push((name, version.trim().to_string()));
            }
        }
        Ok(out)
    }

    /// Starts an install and returns its event stream. The stream ends after `Done` or `Error`.
    /// The install keeps running when the receiver is dropped.
    pub fn install(self: &Arc<Self>, runtime: &str) -> Result<mpsc::Receiver<InstallEvent>> {
        validate_runtime(runtime)?;
        {
            let mut installing = self.installing.lock().unwrap_or_else(PoisonError::into_inner);
            if !installing.insert(runtime.to_string()) {
                return Err(PanelError::InstallFailed(format!(
                    "{} is already being installed",
                    runtime
                )));
            }
        }
        let slot = InstallSlot {
            runtime: runtime.to_string(),
            installing: self.installing.clone(),
        };
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let this = self.clone();
        let runtime = runtime.to_string();
        tokio::spawn(async move {
            let _slot = slot;
            let partial = this.java_dir.join(format!(".{}.partial", runtime));
            let event = match this.run_install(&runtime, &partial, &tx).await {
                Ok(version) => {
                    tracing::info!(runtime = %runtime, version = %version, "java runtime installed");
                    InstallEvent::Done
                }
                Err(e) => {
                    tracing::warn!(error = %e, runtime = %runtime, operation = "install_java", "java install failed");
                    if let Err(e) = tokio::fs::remove_dir_all(&partial).await
                        && e.kind() != std::io::ErrorKind::NotFound
                    {
                        tracing::warn!(error = %e, path = %partial.display(), "partial install not removed");
                    }
                    InstallEvent::Error(e.to_string())
                }
            };
            let _ = tx.send(event).await;
        });
        Ok(rx)
    }

    async fn run_install(
        &self,
        runtime: &str,
        partial: &Path,
        tx: &mpsc::Sender<InstallEvent>,
    ) -> Result<String> {
        let index = self.fetch_index().await?;
        let entry = index
            .get(platform_key())
            .and_then(|runtimes| runtimes.get(runtime))
            .and_then(|entries| entries.first())
            .cloned()
            .ok_or_else(|| {
                PanelError::InstallFailed(format!(
                    "{} is not available for {}",
                    runtime,
                    platform_key()
                ))
            })?;
        let manifest = self
            .client
            .get(&entry.manifest.url)
            .send()
            .await?
            .error_for_status()?
            .json::<RuntimeManifest>()
            .await?;

        match tokio::fs::remove_dir_all(partial).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(partial).await?;

        let mut downloads = Vec::new();
        let mut links = Vec::new();
        for (path, file) in &manifest.files {
            if Path::new(path).is_absolute() || path.split('/').any(|p| p == "..") {
                return Err(PanelError::InstallFailed(format!("unsafe path in manifest: {}", path)));
            }
            match file {
                RuntimeFile::Directory => tokio::fs::create_dir_all(partial.join(path)).await?,
                RuntimeFile::File {
                    executable,
                    downloads: d,
                } => downloads.push((path.clone(), *executable, d.raw.clone())),
                RuntimeFile::Link { target } => links.push((path.clone(), target.clone())),
            }
        }

        let pending: Vec<InstallProgress> = downloads
            .iter()
            .map(|(path, _, _)| InstallProgress {
                file: path.clone(),
                completed: false,
            })
            .collect();
        let _ = tx.send(InstallEvent::Progress(pending)).await;

        let total = downloads.len();
        let mut completed = stream::iter(downloads)
            .map(|(path, executable, download)| async move {
                self.download_file(partial, &path, executable, &download)
                    .await
                    .map(|_| path)
            })
            .buffer_unordered(self.settings.download_concurrency.max(1));
        let mut done = 0usize;
        while let Some(result) = completed.next().await {
            let path = result?;
            done += 1;
            tracing::debug!(runtime, file = %path, done, total, "java file downloaded");
            let _ = tx
                .send(InstallEvent::Progress(vec![InstallProgress {
                    file: path,
                    completed: true,
                }]))
                .await;
        }

        #[cfg(unix)]
        for (path, target) in &links {
            let link = partial.join(path);
            if let Some(parent) = link.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::symlink(target, &link).await?;
        }
        #[cfg(not(unix))]
        if !links.is_empty() {
            tracing::debug!(runtime, links = links.len(), "skipping symlinks on this platform");
        }

        tokio::fs::write(partial.join(VERSION_MARKER), &entry.version.name).await?;
        let dest = self.runtime_dir(runtime);
        if tokio::fs::try_exists(&dest).await? {
            self.discard(&dest, runtime).await?;
        }
        tokio::fs::rename(partial, &dest).await?;
        Ok(entry.version.name)
    }

    async fn download_file(
        &self,
        root: &Path,
        path: &str,
        executable: bool,
        download: &manifest::Download,
    ) -> Result<()> {
        let bytes = self
            .client
            .get(&download.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if let Some(size) = download.size
            && size != bytes.len() as u64
        {
            return Err(PanelError::InstallFailed(format!(
                "{}: expected {} bytes, got {}",
                path,
                size,
                bytes.len()
            )));
        }
        let dest = root.join(path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, &bytes).await?;
        #[cfg(unix)]
        if executable {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o755)).await?;
        }
        #[cfg(not(unix))]
        let _ = executable;
        Ok(())
    }

    /// Renames a runtime directory to a hidden trash name, then removes it.
    async fn discard(&self, dir: &Path, runtime: &str) -> Result<()> {
        let trash = self
            .java_dir
            .join(format!(".trash-{}-{}", runtime, uuid::Uuid::new_v4()));
        tokio::fs::rename(dir, &trash).await?;
        if let Err(e) = tokio::fs::remove_dir_all(&trash).await {
            tracing::warn!(error = %e, path = %trash.display(), "java trash not fully removed");
        }
        Ok(())
    }

    /// Either the runtime is gone afterwards or an error is returned with it still installed.
    pub async fn uninstall(&self, runtime: &str) -> Result<()> {
        validate_runtime(runtime)?;
        if self.is_installing(runtime) {
            return Err(PanelError::InstallFailed(format!(
                "{} is being installed",
                runtime
            )));
        }
        let dir = self.runtime_dir(runtime);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(PanelError::NotFound(format!("java runtime {}", runtime)));
        }
        self.discard(&dir, runtime).await?;
        tracing::info!(runtime, "java runtime uninstalled");
        Ok(())
    }

    /// Files of an installed runtime, relative and sorted.
    pub async fn list_files(&self, runtime: &str) -> Result<Vec<String>> {
        validate_runtime(runtime)?;
        let dir = self.runtime_dir(runtime);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(PanelError::NotFound(format!("java runtime {}", runtime)));
        }
        let files = tokio::task::spawn_blocking(move || {
            let mut files: Vec<String> = walkdir::WalkDir::new(&dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| !e.file_type().is_dir())
                .filter_map(|e| {
                    e.path().strip_prefix(&dir).ok().map(|p| {
                        p.components()
                            .map(|c| c.as_os_str().to_string_lossy().into_owned())
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                })
                .filter(|p| p != VERSION_MARKER)
                .collect();
            files.sort();
            files
        })
        .await?;
        Ok(files)
    }
}
