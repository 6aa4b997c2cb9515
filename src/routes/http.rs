// Public GET handlers: service banner and version info

use axum::{Json, extract::State};
use serde::Serialize;

use super::AppState;
use crate::version::{NAME, VERSION};

#[derive(Debug, Serialize)]
pub(super) struct VersionInfo {
    name: &'static str,
    version: &'static str,
    /// False when every request runs as the anonymous admin; the SPA skips its login page.
    auth_enabled: bool,
}

/// GET /
pub(super) async fn root() -> &'static str {
    NAME
}

/// GET /version: build version plus whether the panel asks for a login.
pub(super) async fn version_handler(State(state): State<AppState>) -> Json<VersionInfo> {
    Json(VersionInfo {
        name: NAME,
        version: VERSION,
        auth_enabled: state.auth.enabled(),
    })
}
