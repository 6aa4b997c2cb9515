// File listing models

use serde::{Deserialize, Serialize};

/// Coarse file category derived from the MIME type at listing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileCategory {
    Text,
    Image,
    Audio,
    Archive,
    Video,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    pub name: String,
    /// Path relative to the server root, `/`-separated.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    /// Display label, e.g. "Directory" or "JSON File".
    #[serde(rename = "type")]
    pub type_: String,
    pub mime: String,
    pub category: FileCategory,
    pub last_modified: Option<i64>,
    pub created: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathRequest {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameRequest {
    pub path: String,
    pub new_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub source: String,
    pub destination: String,
}

/// JSON part of a multipart upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadMetadata {
    pub filename: String,
    #[serde(default)]
    pub directory: String,
}
