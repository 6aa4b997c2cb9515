// Error taxonomy shared by services and HTTP handlers.
// Every variant maps to a status code and a stable snake_case `code` in the JSON body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Which login field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialField {
    Username,
    Password,
}

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("no running process for server {0}")]
    ProcessNotRunning(String),
    #[error("server {0} already has a backup or restore in progress")]
    ServerBusy(String),
    #[error("path escapes the server root: {0}")]
    PathEscapesRoot(String),
    #[error("install failed: {0}")]
    InstallFailed(String),
    #[error("invalid credentials")]
    InvalidCredentials { field: CredentialField },
    #[error("token expired or missing")]
    TokenExpiredOrMissing,
    #[error("invalid schedule: {0}")]
    ScheduleInvalid(String),
    #[error("an incremental backup needs a full backup to build on")]
    NoFullBackup,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("forbidden")]
    Forbidden,
    #[error("request cancelled")]
    Cancelled,
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = PanelError> = std::result::Result<T, E>;

impl From<reqwest::Error> for PanelError {
    fn from(e: reqwest::Error) -> Self {
        PanelError::Upstream(e.to_string())
    }
}

impl From<tokio::task::JoinError> for PanelError {
    fn from(e: tokio::task::JoinError) -> Self {
        PanelError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    }
}

impl PanelError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            PanelError::ProcessNotRunning(_) => "process_not_running",
            PanelError::ServerBusy(_) => "server_busy",
            PanelError::PathEscapesRoot(_) => "path_escapes_root",
            PanelError::InstallFailed(_) => "install_failed",
            PanelError::InvalidCredentials { .. } => "invalid_credentials",
            PanelError::TokenExpiredOrMissing => "token_expired_or_missing",
            PanelError::ScheduleInvalid(_) => "schedule_invalid",
            PanelError::NoFullBackup => "no_full_backup",
            PanelError::NotFound(_) => "not_found",
            PanelError::BadRequest(_) => "bad_request",
            PanelError::AlreadyExists(_) => "already_exists",
            PanelError::Forbidden => "forbidden",
            PanelError::Cancelled => "cancelled",
            PanelError::Upstream(_) => "upstream",
            PanelError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => "not_found",
            PanelError::Io(_) => "io",
            PanelError::Database(_) => "database",
            PanelError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PanelError::ProcessNotRunning(_) | PanelError::ServerBusy(_) => StatusCode::CONFLICT,
            PanelError::AlreadyExists(_) => StatusCode::CONFLICT,
            PanelError::PathEscapesRoot(_) | PanelError::Forbidden => StatusCode::FORBIDDEN,
            PanelError::InvalidCredentials { .. } | PanelError::TokenExpiredOrMissing => {
                StatusCode::UNAUTHORIZED
            }
            PanelError::ScheduleInvalid(_)
            | PanelError::BadRequest(_)
            | PanelError::NoFullBackup => StatusCode::BAD_REQUEST,
            PanelError::NotFound(_) => StatusCode::NOT_FOUND,
            PanelError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            // 499: client closed request
            PanelError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
            }
            PanelError::Upstream(_) | PanelError::InstallFailed(_) => StatusCode::BAD_GATEWAY,
            PanelError::Io(_) | PanelError::Database(_) | PanelError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<CredentialField>,
}

impl IntoResponse for PanelError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, code = self.code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
        }
        let field = match &self {
            PanelError::InvalidCredentials { field } => Some(*field),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
            field,
        };
        (status, Json(body)).into_response()
    }
}
