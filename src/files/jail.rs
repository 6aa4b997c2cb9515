// Path jail: every request path resolves inside the server root or fails.

use crate::error::{PanelError, Result};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Jail {
    root: PathBuf,
}

impl Jail {
    /// `root` must exist; it is canonicalized once.
    pub fn new(root: &Path) -> Result<Self> {
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `requested` onto the root. `..` may not climb above the root, and the deepest
    /// existing ancestor is canonicalized so symlinks cannot point outside it. No I/O happens
    /// outside the root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let normalized = normalize(requested)?;
        self.resolve_normalized(&normalized, requested)
    }

    /// Like `resolve`, but the final component is not followed: a symlink resolves to the
    /// link itself. Only its parent has to stay inside the root.
    pub fn resolve_entry(&self, requested: &str) -> Result<PathBuf> {
        let normalized = normalize(requested)?;
        let Some(name) = normalized.file_name() else {
            return Ok(self.root.clone());
        };
        let parent = normalized.parent().unwrap_or_else(|| Path::new(""));
        Ok(self.resolve_normalized(parent, requested)?.join(name))
    }

    fn resolve_normalized(&self, normalized: &Path, requested: &str) -> Result<PathBuf> {
        let escape = || PanelError::PathEscapesRoot(requested.to_string());
        let candidate = self.root.join(normalized);
        let mut existing = candidate.as_path();
        let mut missing: Vec<OsString> = Vec::new();
        let resolved = loop {
            match existing.canonicalize() {
                Ok(canonical) => break canonical,
                Err(_) => {
                    // A dangling symlink would be followed by a later create.
                    if existing.symlink_metadata().is_ok() {
                        return Err(escape());
                    }
                    let Some(name) = existing.file_name() else {
                        return Err(escape());
                    };
                    missing.push(name.to_os_string());
                    existing = existing.parent().ok_or_else(escape)?;
                }
            }
        };
        if !resolved.starts_with(&self.root) {
            return Err(escape());
        }
        let mut out = resolved;
        for part in missing.into_iter().rev() {
            out.push(part);
        }
        Ok(out)
    }

    /// `/`-separated path of `abs` relative to the root ("" for the root itself).
    pub fn relative(&self, abs: &Path) -> String {
        abs.strip_prefix(&self.root)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default()
    }
}

/// Lexical normalization; `..` may not climb above the root.
fn normalize(requested: &str) -> Result<PathBuf> {
    let escape = || PanelError::PathEscapesRoot(requested.to_string());
    let trimmed = requested.trim_start_matches(['/', '\\']);
    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_dirs_cannot_escape() {
        let dir = tempfile::tempdir().unwrap();
        let jail = Jail::new(dir.path()).unwrap();
        assert!(matches!(
            jail.resolve("../../etc/passwd"),
            Err(PanelError::PathEscapesRoot(_))
        ));
        assert!(matches!(
            jail.resolve("world/../../x"),
            Err(PanelError::PathEscapesRoot(_))
        ));
        assert_eq!(jail.resolve("world/../a.txt").unwrap(), jail.root().join("a.txt"));
        assert_eq!(jail.resolve("/").unwrap(), jail.root());
        assert_eq!(jail.resolve("/new/dir").unwrap(), jail.root().join("new/dir"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_out_of_root_are_rejected() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"x").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone"), dir.path().join("dangling"))
            .unwrap();
        let jail = Jail::new(dir.path()).unwrap();
        assert!(matches!(
            jail.resolve("link/secret"),
            Err(PanelError::PathEscapesRoot(_))
        ));
        assert!(matches!(
            jail.resolve("link/new.txt"),
            Err(PanelError::PathEscapesRoot(_))
        ));
        assert!(matches!(
            jail.resolve("dangling"),
            Err(PanelError::PathEscapesRoot(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn entries_name_the_link_not_its_target() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("world")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("world"), dir.path().join("world-link"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("out")).unwrap();
        let jail = Jail::new(dir.path()).unwrap();

        assert_eq!(jail.resolve("world-link").unwrap(), jail.root().join("world"));
        assert_eq!(
            jail.resolve_entry("world-link").unwrap(),
            jail.root().join("world-link")
        );
        assert_eq!(jail.resolve_entry("out").unwrap(), jail.root().join("out"));
        assert_eq!(jail.resolve_entry("/").unwrap(), jail.root());
        assert!(matches!(
            jail.resolve_entry("out/file"),
            Err(PanelError::PathEscapesRoot(_))
        ));
        assert!(matches!(
            jail.resolve_entry("../x"),
            Err(PanelError::PathEscapesRoot(_))
        ));
    }
}
