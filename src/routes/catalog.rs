// Read-mostly catalogs: Java runtimes, Minecraft versions, loaders, modpack discovery.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::error::{PanelError, Result};
use crate::minecraft::MinecraftVersion;
use crate::models::{DiscoverQuery, Instance, JavaVersion, LoaderType, UserProfile};

/// GET /api/java/versions
pub(super) async fn java_versions(State(state): State<AppState>) -> Result<Json<Vec<JavaVersion>>> {
    Ok(Json(state.java.versions().await?))
}

/// DELETE /api/java/versions/{runtime}: admins only.
pub(super) async fn java_uninstall(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(runtime): Path<String>,
) -> Result<StatusCode> {
    if !user.admin {
        return Err(PanelError::Forbidden);
    }
    state.java.uninstall(&runtime).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/java/versions/{runtime}/files
pub(super) async fn java_files(
    State(state): State<AppState>,
    Path(runtime): Path<String>,
) -> Result<Json<Vec<String>>> {
    Ok(Json(state.java.list_files(&runtime).await?))
}

/// GET /api/minecraft/versions
pub(super) async fn minecraft_versions(
    State(state): State<AppState>,
) -> Result<Json<Vec<MinecraftVersion>>> {
    Ok(Json(state.minecraft.versions().await?))
}

/// GET /api/minecraft/versions/releases
pub(super) async fn minecraft_releases(
    State(state): State<AppState>,
) -> Result<Json<Vec<MinecraftVersion>>> {
    Ok(Json(state.minecraft.releases().await?))
}

/// GET /api/minecraft/versions/snapshots
pub(super) async fn minecraft_snapshots(
    State(state): State<AppState>,
) -> Result<Json<Vec<MinecraftVersion>>> {
    Ok(Json(state.minecraft.snapshots().await?))
}

/// GET /api/loaders/{loader}/{minecraft_version}
pub(super) async fn loader_versions(
    State(state): State<AppState>,
    Path((loader, minecraft_version)): Path<(String, String)>,
) -> Result<Json<Vec<String>>> {
    let loader = LoaderType::parse(&loader)
        .ok_or_else(|| PanelError::BadRequest(format!("unknown loader: {}", loader)))?;
    Ok(Json(
        state
            .minecraft
            .loader_versions(loader, &minecraft_version)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct SupportedLoadersQuery {
    #[serde(default)]
    snapshot: bool,
}

/// GET /api/loaders/supported_loaders/{minecraft_version}?snapshot=bool
pub(super) async fn supported_loaders(
    State(state): State<AppState>,
    Path(minecraft_version): Path<String>,
    Query(query): Query<SupportedLoadersQuery>,
) -> Json<Vec<LoaderType>> {
    Json(
        state
            .minecraft
            .supported_loaders(&minecraft_version, query.snapshot)
            .await,
    )
}

/// GET /api/instances/discover: the search is cancelled when the client goes away.
pub(super) async fn discover(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
) -> Result<Json<Vec<Instance>>> {
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    Ok(Json(state.discovery.search(&query, &cancel).await?))
}
