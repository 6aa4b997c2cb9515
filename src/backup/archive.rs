// Blocking archive helpers: directory scan with hashes, tar.gz write/extract, manifest diff.
// Callers run these inside spawn_blocking.

use crate::models::{BackupManifest, ManifestEntry};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use walkdir::WalkDir;

/// Prefix of hidden entries the file gateway uses while deleting; never archived.
pub const TRASH_PREFIX: &str = ".mcpanel-trash-";

/// Relative path with `/` separators.
fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// True when `rel` equals an exclusion or lies below one.
pub fn is_excluded(rel: &str, exclusions: &[String]) -> bool {
    exclusions.iter().any(|ex| {
        let ex = ex.trim_matches('/');
        !ex.is_empty() && (rel == ex || rel.starts_with(&format!("{}/", ex)))
    })
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Every regular file under `root` minus exclusions, sorted by path.
pub fn scan(root: &Path, exclusions: &[String]) -> io::Result<BackupManifest> {
    let mut entries = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        if name.starts_with(TRASH_PREFIX) {
            return false;
        }
        match relative(root, e.path()) {
            Some(rel) => !is_excluded(&rel, exclusions),
            None => true,
        }
    }) {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = relative(root, entry.path()) else {
            continue;
        };
        let meta = entry.metadata().map_err(io::Error::other)?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        entries.push(ManifestEntry {
            sha256: sha256_file(entry.path())?,
            path: rel,
            size: meta.len(),
            modified,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(BackupManifest {
        entries,
        deleted: Vec::new(),
    })
}

/// Paths whose content changed or appeared since `base`, and paths that disappeared.
pub fn diff(base: &BackupManifest, current: &BackupManifest) -> (Vec<String>, Vec<String>) {
    let changed = current
        .entries
        .iter()
        .filter(|e| match base.get(&e.path) {
            Some(prev) => prev.sha256 != e.sha256 || prev.size != e.size,
            None => true,
        })
        .map(|e| e.path.clone())
        .collect();
    let deleted = base
        .entries
        .iter()
        .filter(|e| current.get(&e.path).is_none())
        .map(|e| e.path.clone())
        .collect();
    (changed, deleted)
}

/// Writes `paths` (relative to `root`) into a gzip tarball at `dest`. The archive is built
/// under a temporary name and renamed into place. Returns the archive size.
pub fn write_archive(root: &Path, paths: &[String], dest: &Path) -> io::Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(dest);
    let result = (|| {
        let file = File::create(&partial)?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = Builder::new(encoder);
        builder.follow_symlinks(false);
        for rel in paths {
            builder.append_path_with_name(root.join(rel), rel)?;
        }
        let encoder = builder.into_inner()?;
        let writer = encoder.finish()?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&partial, dest)?;
        fs::metadata(dest).map(|m| m.len())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

/// Unpacks a gzip tarball into `dest`, overwriting existing files.
pub fn extract(archive: &Path, dest: &Path) -> io::Result<()> {
    let file = File::open(archive)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_overwrite(true);
    archive.set_preserve_mtime(true);
    archive.unpack(dest)
}

/// Removes every entry of `dir` except trash entries and paths matching `keep`, which a
/// backup never contains. The directory itself stays.
pub fn clear_dir(dir: &Path, keep: &[String]) -> io::Result<()> {
    if !dir.exists() {
        return fs::create_dir_all(dir);
    }
    clear_below(dir, dir, keep)
}

fn clear_below(root: &Path, dir: &Path, keep: &[String]) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_name().to_string_lossy().starts_with(TRASH_PREFIX) {
            continue;
        }
        let Some(rel) = relative(root, &path) else {
            continue;
        };
        if is_excluded(&rel, keep) {
            continue;
        }
        if !entry.file_type()?.is_dir() {
            fs::remove_file(&path)?;
            continue;
        }
        let prefix = format!("{}/", rel);
        if keep.iter().any(|k| k.trim_matches('/').starts_with(&prefix)) {
            // Something below is kept.
            clear_below(root, &path, keep)?;
            if fs::read_dir(&path)?.next().is_none() {
                fs::remove_dir(&path)?;
            }
        } else {
            fs::remove_dir_all(&path)?;
        }
    }
    Ok(())
}

/// Applies the deletions recorded by an incremental backup.
pub fn remove_paths(root: &Path, paths: &[String]) -> io::Result<()> {
    for rel in paths {
        match fs::remove_file(root.join(rel)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusions_match_prefix_components() {
        let ex = vec!["logs".to_string(), "plugins/WorldEdit/sessions/".to_string()];
        assert!(is_excluded("logs", &ex));
        assert!(is_excluded("logs/latest.log", &ex));
        assert!(!is_excluded("logsbook.txt", &ex));
        assert!(is_excluded("plugins/WorldEdit/sessions/a.bin", &ex));
        assert!(!is_excluded("plugins/WorldEdit/config.yml", &ex));
    }

    #[test]
    fn scan_archive_extract() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("world/region")).unwrap();
        fs::create_dir_all(src.path().join("logs")).unwrap();
        fs::write(src.path().join("world/region/r.0.0.mca"), b"chunk").unwrap();
        fs::write(src.path().join("server.properties"), b"motd=hi").unwrap();
        fs::write(src.path().join("logs/latest.log"), b"noise").unwrap();

        let manifest = scan(src.path(), &["logs".to_string()]).unwrap();
        let paths: Vec<&str> = manifest.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["server.properties", "world/region/r.0.0.mca"]);

        let out = tempfile::tempdir().unwrap();
        let tarball = out.path().join("b.tar.gz");
        let all: Vec<String> = manifest.entries.iter().map(|e| e.path.clone()).collect();
        let size = write_archive(src.path(), &all, &tarball).unwrap();
        assert!(size > 0);
        assert!(!out.path().join("b.tar.gz.partial").exists());

        let dest = tempfile::tempdir().unwrap();
        extract(&tarball, dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("world/region/r.0.0.mca")).unwrap(), b"chunk");
        assert!(!dest.path().join("logs").exists());
    }

    #[test]
    fn clear_keeps_trash_and_excluded_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("logs")).unwrap();
        fs::create_dir_all(root.join("world/region")).unwrap();
        fs::create_dir_all(root.join("world/playerdata")).unwrap();
        fs::create_dir_all(root.join(format!("{}old", TRASH_PREFIX))).unwrap();
        fs::write(root.join("logs/latest.log"), b"log").unwrap();
        fs::write(root.join("world/region/r.0.0.mca"), b"chunk").unwrap();
        fs::write(root.join("world/playerdata/p.dat"), b"player").unwrap();
        fs::write(root.join("server.properties"), b"motd=hi").unwrap();

        let keep = vec!["logs".to_string(), "world/playerdata/".to_string()];
        clear_dir(root, &keep).unwrap();

        assert!(root.join("logs/latest.log").exists());
        assert!(root.join("world/playerdata/p.dat").exists());
        assert!(root.join(format!("{}old", TRASH_PREFIX)).exists());
        assert!(!root.join("world/region").exists());
        assert!(!root.join("server.properties").exists());

        clear_dir(root, &[]).unwrap();
        assert!(!root.join("logs").exists());
        assert!(!root.join("world").exists());
        assert!(root.join(format!("{}old", TRASH_PREFIX)).exists());
    }

    #[test]
    fn diff_reports_changes_and_deletions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"1").unwrap();
        fs::write(dir.path().join("b"), b"2").unwrap();
        let base = scan(dir.path(), &[]).unwrap();
        fs::write(dir.path().join("a"), b"changed").unwrap();
        fs::remove_file(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("c"), b"3").unwrap();
        let current = scan(dir.path(), &[]).unwrap();
        let (changed, deleted) = diff(&base, &current);
        assert_eq!(changed, vec!["a", "c"]);
        assert_eq!(deleted, vec!["b"]);
    }
}
