// HTTP + SSE routes

mod auth;
mod backups;
mod catalog;
mod files;
mod http;
mod notifications;
mod servers;
mod sse;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::AuthService;
use crate::backup::BackupEngine;
use crate::broadcaster::StateBroadcaster;
use crate::config::AppConfig;
use crate::discovery::DiscoveryClient;
use crate::files::FileGateway;
use crate::java::JavaInstaller;
use crate::minecraft::MinecraftService;
use crate::notifications::NotificationCenter;
use crate::registry::ServerRegistry;
use crate::servers::ServerService;
use crate::store::Store;
use crate::supervisor::{ProcessStats, Supervisor};

/// Uploads larger than this are rejected before they reach the handler.
const UPLOAD_LIMIT_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<Store>,
    pub registry: Arc<ServerRegistry>,
    pub broadcaster: Arc<StateBroadcaster>,
    pub supervisor: Arc<Supervisor>,
    pub backups: Arc<BackupEngine>,
    pub servers: Arc<ServerService>,
    pub files: Arc<FileGateway>,
    pub java: Arc<JavaInstaller>,
    pub minecraft: Arc<MinecraftService>,
    pub discovery: Arc<DiscoveryClient>,
    pub notifications: Arc<NotificationCenter>,
    pub auth: Arc<AuthService>,
    pub stats: Arc<ProcessStats>,
}

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/user", get(auth::me))
        .route("/server", get(servers::list).post(servers::create))
        .route(
            "/server/{id}",
            get(servers::get).patch(servers::update).delete(servers::delete),
        )
        .route("/server/{id}/start", post(servers::start))
        .route("/server/{id}/stop", post(servers::stop))
        .route("/server/{id}/restart", post(servers::restart))
        .route("/server/{id}/kill", post(servers::kill))
        .route("/server/{id}/console", post(servers::console))
        .route("/server/{id}/state/sse", get(sse::state))
        .route("/server/{id}/console/sse", get(sse::console).post(sse::console))
        .route("/server/{id}/files", post(files::list).delete(files::delete))
        .route(
            "/server/{id}/files/upload",
            post(files::upload).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/server/{id}/files/download/{*path}", get(files::download))
        .route("/server/{id}/files/create/directory", post(files::create_directory))
        .route("/server/{id}/files/create/file", post(files::create_file))
        .route("/server/{id}/files/rename", post(files::rename))
        .route("/server/{id}/files/copy", post(files::copy))
        .route("/server/{id}/files/move", post(files::move_to))
        .route("/server/{id}/backups", get(backups::list).post(backups::create))
        .route(
            "/server/{id}/backups/settings",
            get(backups::settings).put(backups::configure),
        )
        .route("/server/{id}/backups/{backup_id}", delete(backups::delete))
        .route("/server/{id}/backups/{backup_id}/restore", post(backups::restore))
        .route("/java/versions", get(catalog::java_versions))
        .route("/java/versions/{runtime}", delete(catalog::java_uninstall))
        .route("/java/versions/{runtime}/files", get(catalog::java_files))
        .route("/java/install/{runtime}/sse", get(sse::java_install))
        .route(
            "/loaders/supported_loaders/{minecraft_version}",
            get(catalog::supported_loaders),
        )
        .route("/loaders/{loader}/{minecraft_version}", get(catalog::loader_versions))
        .route("/minecraft/versions", get(catalog::minecraft_versions))
        .route("/minecraft/versions/releases", get(catalog::minecraft_releases))
        .route("/minecraft/versions/snapshots", get(catalog::minecraft_snapshots))
        .route("/instances/discover", get(catalog::discover))
        .route("/notifications", get(sse::notifications))
        .route("/notifications/{action}/{id}", post(notifications::apply))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_user));

    Router::new()
        .route("/", get(http::root))
        .route("/version", get(http::version_handler))
        .route("/auth/login", post(auth::login))
        .route("/auth/login/token", post(auth::login_token))
        .route("/auth/logout", post(auth::logout))
        .nest("/api", api)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
