// Server CRUD, lifecycle and console commands.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use super::AppState;
use crate::error::Result;
use crate::models::{ConsoleCommand, CreateServerRequest, Server, UpdateServerRequest, UserProfile};

/// GET /api/server
pub(super) async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
) -> Json<Vec<Server>> {
    Json(state.servers.list_for(&user).await)
}

/// POST /api/server
pub(super) async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Json(req): Json<CreateServerRequest>,
) -> Result<(StatusCode, Json<Server>)> {
    let server = state.servers.create(&user, req).await?;
    Ok((StatusCode::CREATED, Json(server)))
}

/// GET /api/server/{id}
pub(super) async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
) -> Result<Json<Server>> {
    Ok(Json(state.servers.get_for(&user, &id).await?))
}

/// PATCH /api/server/{id}
pub(super) async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Json(req): Json<UpdateServerRequest>,
) -> Result<Json<Server>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.servers.update(&id, req).await?))
}

/// DELETE /api/server/{id}
pub(super) async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.servers.delete(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/server/{id}/start
pub(super) async fn start(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
) -> Result<Json<Server>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.supervisor.start(&id).await?))
}

/// POST /api/server/{id}/stop
pub(super) async fn stop(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
) -> Result<Json<Server>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.supervisor.stop(&id).await?))
}

/// POST /api/server/{id}/restart
pub(super) async fn restart(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
) -> Result<Json<Server>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.supervisor.restart(&id).await?))
}

/// POST /api/server/{id}/kill
pub(super) async fn kill(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
) -> Result<Json<Server>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.supervisor.kill(&id).await?))
}

/// POST /api/server/{id}/console
pub(super) async fn console(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Json(req): Json<ConsoleCommand>,
) -> Result<StatusCode> {
    state.servers.get_for(&user, &id).await?;
    state.supervisor.send_command(&id, &req.command).await?;
    tracing::debug!(server_id = %id, username = %user.username, "console command sent");
    Ok(StatusCode::ACCEPTED)
}
