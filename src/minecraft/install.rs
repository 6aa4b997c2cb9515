// Server directory preparation: server.properties, eula.txt and the server jar or loader install.

use super::MinecraftService;
use crate::error::{PanelError, Result};
use crate::models::{CreateServerRequest, LoaderType, Server};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const QUILT_INSTALLER_URL: &str =
    "https://quiltmc.org/api/v1/download-latest-installer/java-universal";

pub struct ServerInstaller {
    minecraft: Arc<MinecraftService>,
    default_java: String,
}

/// `server.properties` for a new server.
pub fn server_properties(req: &CreateServerRequest) -> String {
    format!(
        "#Minecraft server properties\n\
         server-port={}\n\
         difficulty={}\n\
         gamemode={}\n\
         hardcore={}\n\
         max-players={}\n\
         motd={}\n",
        req.port,
        req.difficulty,
        req.gamemode,
        req.hardcore,
        req.max_players,
        req.name.replace(['\n', '\r'], " "),
    )
}

/// Executable written before the jar is installed; the install replaces it.
pub fn default_executable(loader: LoaderType) -> &'static str {
    match loader {
        LoaderType::Fabric => "fabric-server-launch.jar",
        LoaderType::Quilt => "quilt-server-launch.jar",
        _ => "server.jar",
    }
}

impl ServerInstaller {
    pub fn new(minecraft: Arc<MinecraftService>, default_java: impl Into<String>) -> Self {
        Self {
            minecraft,
            default_java: default_java.into(),
        }
    }

    /// Writes server.properties and eula.txt into a fresh server directory.
    pub async fn prepare_directory(&self, dir: &Path, req: &CreateServerRequest) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join("server.properties"), server_properties(req)).await?;
        tokio::fs::write(dir.join("eula.txt"), "eula=true\n").await?;
        Ok(())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let bytes = self
            .minecraft
            .client()
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    /// Installs the server jar for the server's loader. Returns the executable to launch.
    pub async fn install(&self, server: &Server) -> Result<String> {
        let dir = PathBuf::from(&server.directory);
        let mc = server.minecraft_version.as_str();
        let loader_version = self
            .minecraft
            .resolve_loader_version(server.loader_type, mc, &server.loader_version)
            .await?;
        match server.loader_type {
            LoaderType::Vanilla => {
                let url = self.minecraft.server_jar_url(mc).await?;
                self.download(&url, &dir.join("server.jar")).await?;
                Ok("server.jar".into())
            }
            LoaderType::Fabric => {
                let installer = self.minecraft.fabric_installer().await?;
                let url = format!(
                    "{}/versions/loader/{}/{}/{}/server/jar",
                    self.minecraft.config().fabric_meta_url,
                    mc,
                    loader_version,
                    installer
                );
                let exe = default_executable(LoaderType::Fabric);
                self.download(&url, &dir.join(exe)).await?;
                Ok(exe.into())
            }
            LoaderType::Quilt => {
                let installer = dir.join("quilt-installer.jar");
                self.download(QUILT_INSTALLER_URL, &installer).await?;
                self.run_installer(
                    server,
                    &installer,
                    &[
                        "install".into(),
                        "server".into(),
                        mc.into(),
                        loader_version.clone(),
                        "--download-server".into(),
                        format!("--install-dir={}", dir.display()),
                    ],
                )
                .await?;
                Ok(default_executable(LoaderType::Quilt).into())
            }
            LoaderType::Forge => {
                let full = format!("{}-{}", mc, loader_version);
                let url = format!(
                    "{}/net/minecraftforge/forge/{full}/forge-{full}-installer.jar",
                    self.minecraft.config().forge_maven_url
                );
                let installer = dir.join("forge-installer.jar");
                self.download(&url, &installer).await?;
                self.run_installer(server, &installer, &["--installServer".into()])
                    .await?;
                detect_executable(&dir, &format!("libraries/net/minecraftforge/forge/{}", full), "forge-")
                    .await
            }
            LoaderType::NeoForge => {
                let url = format!(
                    "{}/releases/net/neoforged/neoforge/{v}/neoforge-{v}-installer.jar",
                    self.minecraft.config().neoforge_maven_url,
                    v = loader_version
                );
                let installer = dir.join("neoforge-installer.jar");
                self.download(&url, &installer).await?;
                self.run_installer(server, &installer, &["--installServer".into()])
                    .await?;
                detect_executable(
                    &dir,
                    &format!("libraries/net/neoforged/neoforge/{}", loader_version),
                    "neoforge-",
                )
                .await
            }
        }
    }

    async fn run_installer(&self, server: &Server, installer: &Path, args: &[String]) -> Result<()> {
        let java = server
            .java_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.default_java);
        tracing::info!(server_id = %server.id, installer = %installer.display(), "running loader installer");
        let output = tokio::process::Command::new(java)
            .arg("-jar")
            .arg(installer)
            .args(args)
            .current_dir(&server.directory)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PanelError::InstallFailed(format!("failed to run {}: {}", java, e)))?;
        let _ = tokio::fs::remove_file(installer).await;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(PanelError::InstallFailed(format!(
                "installer exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }
        Ok(())
    }
}

/// Modern Forge/NeoForge installs launch through an argument file; older Forge ships a jar.
async fn detect_executable(dir: &Path, libraries: &str, jar_prefix: &str) -> Result<String> {
    let args_file = if cfg!(windows) { "win_args.txt" } else { "unix_args.txt" };
    let rel = format!("{}/{}", libraries, args_file);
    if tokio::fs::try_exists(dir.join(&rel)).await? {
        return Ok(format!("@{}", rel));
    }
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(jar_prefix) && name.ends_with(".jar") && !name.contains("installer") {
            return Ok(name);
        }
    }
    Err(PanelError::InstallFailed(
        "installer finished but no server launcher was found".into(),
    ))
}
