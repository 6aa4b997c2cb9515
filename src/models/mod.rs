// Domain models shared by services and routes

mod backup;
mod files;
mod instance;
mod java;
mod notification;
mod server;
mod user;

pub use backup::{
    Backup, BackupKind, BackupManifest, BackupSettings, CreateBackupRequest, ManifestEntry,
};
pub use files::{
    FileCategory, FileItem, PathRequest, RenameRequest, TransferRequest, UploadMetadata,
};
pub use instance::{DiscoverQuery, DiscoverSort, Instance, Platform};
pub use java::{InstallEvent, InstallProgress, JavaVersion};
pub use notification::{Notification, NotificationAction, SenderType};
pub use server::{
    ConsoleCommand, CreateServerRequest, LoaderType, Server, ServerStatus, UpdateServerRequest,
};
pub use user::{LoginRequest, LoginResponse, TokenLoginRequest, UserProfile};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
