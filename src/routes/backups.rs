// Backup endpoints: list, create, settings, restore, delete.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use super::AppState;
use crate::error::Result;
use crate::models::{Backup, BackupSettings, CreateBackupRequest, Server, UserProfile};

/// GET /api/server/{id}/backups: oldest first.
pub(super) async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Backup>>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.backups.list(&id).await?))
}

/// POST /api/server/{id}/backups: runs the backup before responding.
pub(super) async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    body: Option<Json<CreateBackupRequest>>,
) -> Result<(StatusCode, Json<Backup>)> {
    state.servers.get_for(&user, &id).await?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let backup = state
        .backups
        .create_manual_backup(&id, req.kind, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(backup)))
}

/// GET /api/server/{id}/backups/settings
pub(super) async fn settings(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
) -> Result<Json<BackupSettings>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.backups.settings(&id).await?))
}

/// PUT /api/server/{id}/backups/settings: replaces settings and re-arms the schedule.
pub(super) async fn configure(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Json(settings): Json<BackupSettings>,
) -> Result<Json<BackupSettings>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.backups.configure_schedule(&id, settings).await?))
}

/// POST /api/server/{id}/backups/{backup_id}/restore
pub(super) async fn restore(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path((id, backup_id)): Path<(String, String)>,
) -> Result<Json<Server>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.backups.restore(&id, &backup_id).await?))
}

/// DELETE /api/server/{id}/backups/{backup_id}
pub(super) async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path((id, backup_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.servers.get_for(&user, &id).await?;
    state.backups.delete(&id, &backup_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
