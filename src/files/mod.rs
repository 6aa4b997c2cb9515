// Filesystem gateway: jailed file operations on a server directory.
// Mutating operations hold the server's operation lock.

mod category;
mod jail;

pub use category::{category_of, mime_of, type_label};
pub use jail::Jail;

use crate::backup::TRASH_PREFIX;
use crate::error::{PanelError, Result};
use crate::models::FileItem;
use crate::registry::ServerRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Copy,
    Move,
}

pub struct FileGateway {
    registry: Arc<ServerRegistry>,
}

/// An upload written to disk but not yet moved to its destination.
#[derive(Debug)]
pub struct StagedUpload {
    server_id: String,
    path: PathBuf,
    armed: bool,
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn unix_ms(t: std::io::Result<std::time::SystemTime>) -> Option<i64> {
    t.ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
}

fn is_trash(name: &str) -> bool {
    name.starts_with(TRASH_PREFIX)
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !is_trash(name)
}

fn describe(jail: &Jail, path: &Path, meta: &std::fs::Metadata) -> FileItem {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let is_dir = meta.is_dir();
    let mime = if is_dir {
        "inode/directory".to_string()
    } else {
        mime_of(path)
    };
    FileItem {
        category: category_of(&mime, path),
        type_: type_label(path, is_dir),
        path: jail.relative(path),
        name,
        is_dir,
        size: if is_dir { 0 } else { meta.len() },
        mime,
        last_modified: unix_ms(meta.modified()),
        created: unix_ms(meta.created()),
    }
}

/// Total size of regular files under `root` (0 when missing).
pub fn dir_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn copy_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    if src.is_file() {
        std::fs::copy(src, dest)?;
        return Ok(());
    }
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dest.join(rel);
        let ft = entry.file_type();
        if ft.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if ft.is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn found(
    path: &str,
    abs: PathBuf,
    meta: std::io::Result<std::fs::Metadata>,
) -> Result<(PathBuf, std::fs::Metadata)> {
    match meta {
        Ok(meta) => Ok((abs, meta)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PanelError::NotFound(format!("file {}", path)))
        }
        Err(e) => Err(e.into()),
    }
}

impl FileGateway {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self { registry }
    }

    pub async fn jail(&self, server_id: &str) -> Result<Jail> {
        let root = self.registry.root_of(server_id).await?;
        tokio::fs::create_dir_all(&root).await?;
        Jail::new(&root)
    }

    async fn existing(&self, jail: &Jail, path: &str) -> Result<(PathBuf, std::fs::Metadata)> {
        let abs = jail.resolve(path)?;
        let meta = tokio::fs::metadata(&abs).await;
        found(path, abs, meta)
    }

    /// The entry itself: a symlink is not followed.
    async fn existing_entry(&self, jail: &Jail, path: &str) -> Result<(PathBuf, std::fs::Metadata)> {
        let abs = jail.resolve_entry(path)?;
        let meta = tokio::fs::symlink_metadata(&abs).await;
        found(path, abs, meta)
    }

    /// Directory entries, directories first then by name; trash entries hidden.
    pub async fn list(&self, server_id: &str, path: &str) -> Result<Vec<FileItem>> {
        let jail = self.jail(server_id).await?;
        let (dir, meta) = self.existing(&jail, path).await?;
        if !meta.is_dir() {
            return Err(PanelError::BadRequest(format!("{} is not a directory", path)));
        }
        let mut items = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_trash(&name) {
                continue;
            }
            // Entry may vanish between read_dir and metadata.
            let Ok(meta) = tokio::fs::metadata(entry.path()).await else {
                continue;
            };
            items.push(describe(&jail, &entry.path(), &meta));
        }
        items.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(items)
    }

    pub async fn stat(&self, server_id: &str, path: &str) -> Result<FileItem> {
        let jail = self.jail(server_id).await?;
        let (abs, meta) = self.existing(&jail, path).await?;
        Ok(describe(&jail, &abs, &meta))
    }

    /// `path` includes the new file's name. Fails when it exists.
    pub async fn create_file(&self, server_id: &str, path: &str) -> Result<FileItem> {
        let _guard = self.registry.locks().acquire(server_id).await;
        let jail = self.jail(server_id).await?;
        let abs = self.new_entry(&jail, path)?;
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&abs)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => PanelError::AlreadyExists(path.to_string()),
                _ => e.into(),
            })?;
        let meta = file.metadata().await?;
        Ok(describe(&jail, &abs, &meta))
    }

    pub async fn create_directory(&self, server_id: &str, path: &str) -> Result<FileItem> {
        let _guard = self.registry.locks().acquire(server_id).await;
        let jail = self.jail(server_id).await?;
        let abs = self.new_entry(&jail, path)?;
        if tokio::fs::try_exists(&abs).await? {
            return Err(PanelError::AlreadyExists(path.to_string()));
        }
        tokio::fs::create_dir_all(&abs).await?;
        let meta = tokio::fs::metadata(&abs).await?;
        Ok(describe(&jail, &abs, &meta))
    }

    /// Resolves a path to be created; its name must be a plain file name.
    fn new_entry(&self, jail: &Jail, path: &str) -> Result<PathBuf> {
        let abs = jail.resolve(path)?;
        let name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if abs == jail.root() || !valid_name(&name) {
            return Err(PanelError::BadRequest(format!("invalid name: {}", path)));
        }
        Ok(abs)
    }

    /// Renames within the same directory.
    pub async fn rename(&self, server_id: &str, path: &str, new_name: &str) -> Result<FileItem> {
        if !valid_name(new_name) {
            return Err(PanelError::BadRequest(format!("invalid name: {}", new_name)));
        }
        let _guard = self.registry.locks().acquire(server_id).await;
        let jail = self.jail(server_id).await?;
        let (abs, _) = self.existing_entry(&jail, path).await?;
        if abs == jail.root() {
            return Err(PanelError::Forbidden);
        }
        let target = abs.with_file_name(new_name);
        if tokio::fs::symlink_metadata(&target).await.is_ok() {
            return Err(PanelError::AlreadyExists(new_name.to_string()));
        }
        tokio::fs::rename(&abs, &target).await?;
        let meta = tokio::fs::symlink_metadata(&target).await?;
        Ok(describe(&jail, &target, &meta))
    }

    /// Copies or moves `source` to `destination`. An existing directory as destination
    /// receives the entry under its current name.
    pub async fn copy_or_move(
        &self,
        server_id: &str,
        source: &str,
        destination: &str,
        mode: Transfer,
    ) -> Result<FileItem> {
        let _guard = self.registry.locks().acquire(server_id).await;
        let jail = self.jail(server_id).await?;
        // A move relocates a symlink itself; a copy reads through it.
        let (src, _) = match mode {
            Transfer::Move => self.existing_entry(&jail, source).await?,
            Transfer::Copy => self.existing(&jail, source).await?,
        };
        if src == jail.root() {
            return Err(PanelError::Forbidden);
        }
        let mut dest = jail.resolve(destination)?;
        if tokio::fs::metadata(&dest).await.map(|m| m.is_dir()).unwrap_or(false)
            && let Some(name) = src.file_name()
        {
            dest = dest.join(name);
        }
        if dest.starts_with(&src) {
            return Err(PanelError::BadRequest(format!(
                "cannot {} {} into itself",
                if mode == Transfer::Copy { "copy" } else { "move" },
                source
            )));
        }
        if tokio::fs::symlink_metadata(&dest).await.is_ok() {
            return Err(PanelError::AlreadyExists(jail.relative(&dest)));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match mode {
            Transfer::Move => tokio::fs::rename(&src, &dest).await?,
            Transfer::Copy => {
                let (s, d) = (src.clone(), dest.clone());
                tokio::task::spawn_blocking(move || copy_recursive(&s, &d)).await??;
            }
        }
        let meta = tokio::fs::symlink_metadata(&dest).await?;
        Ok(describe(&jail, &dest, &meta))
    }

    /// Recursive delete. The target is first renamed to a hidden trash entry, so a
    /// concurrent listing sees either the whole tree or nothing.
    pub async fn delete(&self, server_id: &str, path: &str) -> Result<()> {
        let _guard = self.registry.locks().acquire(server_id).await;
        let jail = self.jail(server_id).await?;
        if jail.resolve_entry(path)? == jail.root() {
            return Err(PanelError::Forbidden);
        }
        // Symlinks are removed as links; their targets stay.
        let (abs, meta) = self.existing_entry(&jail, path).await?;
        let trash = abs.with_file_name(format!("{}{}", TRASH_PREFIX, uuid::Uuid::new_v4()));
        tokio::fs::rename(&abs, &trash).await?;
        let removed = if meta.is_dir() {
            tokio::fs::remove_dir_all(&trash).await
        } else {
            tokio::fs::remove_file(&trash).await
        };
        if let Err(e) = removed {
            tracing::warn!(error = %e, server_id, path = %trash.display(), "trash entry not fully removed");
        }
        tracing::debug!(server_id, path, "deleted");
        Ok(())
    }

    /// Opens a regular file for streaming.
    pub async fn download(&self, server_id: &str, path: &str) -> Result<(tokio::fs::File, FileItem)> {
        let jail = self.jail(server_id).await?;
        let (abs, meta) = self.existing(&jail, path).await?;
        if meta.is_dir() {
            return Err(PanelError::BadRequest(format!("{} is a directory", path)));
        }
        let file = tokio::fs::File::open(&abs).await?;
        Ok((file, describe(&jail, &abs, &meta)))
    }

    /// Writes `data` to `directory/filename`, replacing an existing file atomically.
    pub async fn upload<R: AsyncRead + Unpin>(
        &self,
        server_id: &str,
        directory: &str,
        filename: &str,
        data: R,
    ) -> Result<FileItem> {
        if !valid_name(filename) {
            return Err(PanelError::BadRequest(format!("invalid name: {}", filename)));
        }
        let staged = self.stage_upload(server_id, data).await?;
        self.commit_upload(staged, directory, filename).await
    }

    /// Streams `data` into a hidden partial file in the server root. The destination can be
    /// chosen afterwards with `commit_upload`; dropping the result removes the partial file.
    pub async fn stage_upload<R: AsyncRead + Unpin>(
        &self,
        server_id: &str,
        mut data: R,
    ) -> Result<StagedUpload> {
        let jail = self.jail(server_id).await?;
        let staged = StagedUpload {
            server_id: server_id.to_string(),
            path: jail
                .root()
                .join(format!("{}{}.upload", TRASH_PREFIX, uuid::Uuid::new_v4())),
            armed: true,
        };
        let mut file = tokio::fs::File::create(&staged.path).await?;
        tokio::io::copy(&mut data, &mut file).await?;
        file.sync_all().await?;
        Ok(staged)
    }

    /// Moves a staged upload to `directory/filename`, replacing an existing file.
    pub async fn commit_upload(
        &self,
        mut staged: StagedUpload,
        directory: &str,
        filename: &str,
    ) -> Result<FileItem> {
        if !valid_name(filename) {
            return Err(PanelError::BadRequest(format!("invalid name: {}", filename)));
        }
        let _guard = self.registry.locks().acquire(&staged.server_id).await;
        let jail = self.jail(&staged.server_id).await?;
        let dir = jail.resolve(directory)?;
        tokio::fs::create_dir_all(&dir).await?;
        let target = dir.join(filename);
        tokio::fs::rename(&staged.path, &target).await?;
        staged.armed = false;
        let meta = tokio::fs::metadata(&target).await?;
        Ok(describe(&jail, &target, &meta))
    }

    pub async fn read_to_string(&self, server_id: &str, path: &str) -> Result<String> {
        let jail = self.jail(server_id).await?;
        let (abs, meta) = self.existing(&jail, path).await?;
        if meta.is_dir() {
            return Err(PanelError::BadRequest(format!("{} is a directory", path)));
        }
        let bytes = tokio::fs::read(&abs).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
