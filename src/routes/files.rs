// File manager endpoints. Every path is relative to the server root.

use axum::{
    Extension, Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};

use super::AppState;
use crate::error::{PanelError, Result};
use crate::files::Transfer;
use crate::models::{FileItem, PathRequest, RenameRequest, TransferRequest, UploadMetadata, UserProfile};

/// POST /api/server/{id}/files: directory listing, directories first.
pub(super) async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Json(req): Json<PathRequest>,
) -> Result<Json<Vec<FileItem>>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.files.list(&id, &req.path).await?))
}

/// DELETE /api/server/{id}/files
pub(super) async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Json(req): Json<PathRequest>,
) -> Result<StatusCode> {
    state.servers.get_for(&user, &id).await?;
    state.files.delete(&id, &req.path).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/server/{id}/files/create/file
pub(super) async fn create_file(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Json(req): Json<PathRequest>,
) -> Result<(StatusCode, Json<FileItem>)> {
    state.servers.get_for(&user, &id).await?;
    let item = state.files.create_file(&id, &req.path).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// POST /api/server/{id}/files/create/directory
pub(super) async fn create_directory(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Json(req): Json<PathRequest>,
) -> Result<(StatusCode, Json<FileItem>)> {
    state.servers.get_for(&user, &id).await?;
    let item = state.files.create_directory(&id, &req.path).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// POST /api/server/{id}/files/rename
pub(super) async fn rename(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<FileItem>> {
    state.servers.get_for(&user, &id).await?;
    Ok(Json(state.files.rename(&id, &req.path, &req.new_name).await?))
}

async fn transfer(
    state: AppState,
    user: UserProfile,
    id: String,
    req: TransferRequest,
    mode: Transfer,
) -> Result<Json<FileItem>> {
    state.servers.get_for(&user, &id).await?;
    let item = state
        .files
        .copy_or_move(&id, &req.source, &req.destination, mode)
        .await?;
    Ok(Json(item))
}

/// POST /api/server/{id}/files/copy
pub(super) async fn copy(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<FileItem>> {
    transfer(state, user, id, req, Transfer::Copy).await
}

/// POST /api/server/{id}/files/move
pub(super) async fn move_to(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<FileItem>> {
    transfer(state, user, id, req, Transfer::Move).await
}

/// POST /api/server/{id}/files/upload: multipart with a `file` part and a JSON part
/// `{filename, directory}`. Without the JSON part the file lands in the root under its
/// own name. The file part is streamed to disk as it arrives.
pub(super) async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileItem>)> {
    state.servers.get_for(&user, &id).await?;
    let mut staged = None;
    let mut file_name = None;
    let mut metadata: Option<UploadMetadata> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PanelError::BadRequest(format!("multipart: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(str::to_string);
            let reader = StreamReader::new(field.map_err(std::io::Error::other));
            tokio::pin!(reader);
            staged = Some(state.files.stage_upload(&id, reader).await?);
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| PanelError::BadRequest(format!("multipart: {}", e)))?;
            metadata = Some(
                serde_json::from_str(&text)
                    .map_err(|e| PanelError::BadRequest(format!("upload metadata: {}", e)))?,
            );
        }
    }
    let staged = staged.ok_or_else(|| PanelError::BadRequest("missing file part".into()))?;
    let (filename, directory) = match metadata {
        Some(m) => (m.filename, m.directory),
        None => (
            file_name.ok_or_else(|| PanelError::BadRequest("missing filename".into()))?,
            String::new(),
        ),
    };
    let item = state.files.commit_upload(staged, &directory, &filename).await?;
    tracing::debug!(server_id = %id, path = %item.path, size = item.size, "file uploaded");
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /api/server/{id}/files/download/{*path}: streams the file.
pub(super) async fn download(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path((id, path)): Path<(String, String)>,
) -> Result<Response> {
    state.servers.get_for(&user, &id).await?;
    let (file, item) = state.files.download(&id, &path).await?;
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        item.name.replace('"', "")
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    if let Ok(mime) = HeaderValue::from_str(&item.mime) {
        headers.insert(header::CONTENT_TYPE, mime);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(item.size));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}
