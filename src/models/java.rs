// Java runtime models

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaVersion {
    pub version: String,
    pub runtime: String,
    pub operating_system: String,
    pub installed: bool,
    #[serde(default)]
    pub executable: Option<PathBuf>,
}

/// One file of an install, reported when it finishes downloading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallProgress {
    pub file: String,
    pub completed: bool,
}

/// Events of `/api/java/install/{runtime}/sse`; the SSE event name is the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InstallEvent {
    Progress(Vec<InstallProgress>),
    Error(String),
    Done,
}

impl InstallEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InstallEvent::Progress(_) => "progress",
            InstallEvent::Error(_) => "error",
            InstallEvent::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InstallEvent::Progress(_))
    }
}
