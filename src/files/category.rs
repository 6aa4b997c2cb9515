// MIME type and category of a file, from its name.

use crate::models::FileCategory;
use std::path::Path;

const TEXT_EXTENSIONS: &[&str] = &[
    "properties", "yml", "yaml", "toml", "json5", "txt", "log", "cfg", "conf", "ini", "md",
    "mcmeta", "sh", "bat", "csv", "snbt", "lang",
];

pub fn mime_of(path: &Path) -> String {
    if TEXT_EXTENSIONS.contains(&extension(path).as_str()) {
        return "text/plain".into();
    }
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn category_of(mime: &str, path: &Path) -> FileCategory {
    let (top, sub) = mime.split_once('/').unwrap_or((mime, ""));
    match top {
        "text" => return FileCategory::Text,
        "image" => return FileCategory::Image,
        "audio" => return FileCategory::Audio,
        "video" => return FileCategory::Video,
        _ => {}
    }
    if matches!(
        sub,
        "zip"
            | "gzip"
            | "x-tar"
            | "x-gzip"
            | "x-7z-compressed"
            | "x-rar-compressed"
            | "vnd.rar"
            | "java-archive"
            | "x-bzip2"
            | "zstd"
    ) {
        return FileCategory::Archive;
    }
    if matches!(sub, "json" | "xml" | "toml" | "x-sh" | "javascript") {
        return FileCategory::Text;
    }
    match extension(path).as_str() {
        "jar" | "mrpack" | "tgz" => FileCategory::Archive,
        ext if TEXT_EXTENSIONS.contains(&ext) => FileCategory::Text,
        _ => FileCategory::Unknown,
    }
}

/// Human label shown in the file browser.
pub fn type_label(path: &Path, is_dir: bool) -> String {
    if is_dir {
        return "Directory".into();
    }
    match extension(path).as_str() {
        "" => "File".into(),
        ext => format!("{} File", ext.to_ascii_uppercase()),
    }
}
