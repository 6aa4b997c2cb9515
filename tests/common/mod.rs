// Shared test helpers: temp data dir, config, a fake `java` and server fixtures.
#![allow(dead_code)]

use mcpanel::auth::AuthService;
use mcpanel::bootstrap::build_state;
use mcpanel::config::AppConfig;
use mcpanel::models::{CreateServerRequest, Server, ServerStatus};
use mcpanel::routes::AppState;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::time::{Duration, Instant};

/// Behaves like a vanilla server console: prints "Done", answers `save-all` with
/// "Saved the game", exits 0 on `stop` and 1 on `crash`, echoes anything else.
const FAKE_JAVA: &str = r#"#!/bin/sh
echo "Starting minecraft server version test"
echo "Done (0.042s)! For help, type \"help\""
while IFS= read -r line; do
  case "$line" in
    stop) echo "Stopping the server"; exit 0 ;;
    crash) echo "Exception in server tick loop" >&2; exit 1 ;;
    save-all*) echo "Saving the game (this may take a moment!)"; echo "Saved the game" ;;
    *) echo "[Server] $line" ;;
  esac
done
exit 0
"#;

/// Ignores `stop` so the supervisor has to kill it.
const STUBBORN_JAVA: &str = r#"#!/bin/sh
echo "Done"
while IFS= read -r line; do
  echo "ignoring $line"
done
sleep 600
"#;

/// Leaves a background child holding the console pipes and ignores `stop`.
const FORKING_JAVA: &str = r#"#!/bin/sh
sleep 30 &
echo "Done"
while IFS= read -r line; do
  echo "ignoring $line"
done
sleep 600
"#;

/// Exits cleanly on `stop` but leaves a background child holding the console pipes.
const LEAKY_JAVA: &str = r#"#!/bin/sh
sleep 30 &
echo "Done"
while IFS= read -r line; do
  case "$line" in
    stop) exit 0 ;;
  esac
done
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

pub fn fake_java(dir: &Path) -> PathBuf {
    write_script(dir, "fake-java", FAKE_JAVA)
}

pub fn stubborn_java(dir: &Path) -> PathBuf {
    write_script(dir, "stubborn-java", STUBBORN_JAVA)
}

pub fn forking_java(dir: &Path) -> PathBuf {
    write_script(dir, "forking-java", FORKING_JAVA)
}

pub fn leaky_java(dir: &Path) -> PathBuf {
    write_script(dir, "leaky-java", LEAKY_JAVA)
}

/// Points a server at another java executable.
pub async fn use_java(state: &AppState, id: &str, java: &Path) {
    state
        .servers
        .update(
            id,
            mcpanel::models::UpdateServerRequest {
                java_path: Some(java.display().to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

pub fn test_config(data_dir: &Path, java: &Path) -> AppConfig {
    AppConfig::load_from_str(&format!(
        r#"
[server]
port = 8081
host = "127.0.0.1"

[storage]
data_dir = '{}'

[supervisor]
stop_grace_secs = 2
log_buffer_lines = 200
default_java_path = '{}'
auto_start = false

[backups]
default_slots = 3
save_timeout_secs = 5
default_exclusions = ["logs"]

[minecraft]
install_server_jars = false

[auth]
enabled = false
"#,
        data_dir.display(),
        java.display()
    ))
    .unwrap()
}

/// Temp dir (keep it alive for the test) and fully wired state.
pub async fn test_state() -> (TempDir, AppState) {
    let dir = TempDir::new().unwrap();
    let java = fake_java(dir.path());
    let config = test_config(&dir.path().join("data"), &java);
    let state = build_state(&config).await.unwrap();
    (dir, state)
}

pub fn create_request(name: &str) -> CreateServerRequest {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "port": 25565,
        "difficulty": "easy",
        "gamemode": "survival",
        "hardcore": false,
        "max_players": 20,
        "minecraft_version": "1.20.4",
        "loader": "Vanilla",
        "loader_version": ""
    }))
    .unwrap()
}

pub async fn create_server(state: &AppState, name: &str) -> Server {
    state
        .servers
        .create(&AuthService::anonymous(), create_request(name))
        .await
        .unwrap()
}

/// Polls the registry until the server reaches `status`.
pub async fn wait_for_status(state: &AppState, id: &str, status: ServerStatus) -> Server {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let server = state.registry.get(id).await.unwrap();
        if server.status == status {
            return server;
        }
        assert!(
            Instant::now() < deadline,
            "server {} stuck in {:?}, expected {:?}",
            id,
            server.status,
            status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Polls the console buffer until a line contains `needle`.
pub async fn wait_for_log(state: &AppState, id: &str, needle: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if state.supervisor.logs(id).snapshot().iter().any(|l| l.contains(needle)) {
            return;
        }
        assert!(Instant::now() < deadline, "no console line containing {:?}", needle);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
