// Java runtime installer against a local manifest server.

use axum::{Json, Router, routing::get};
use mcpanel::error::PanelError;
use mcpanel::java::{JavaInstaller, JavaSettings, platform_key, validate_runtime};
use mcpanel::models::InstallEvent;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

const JAVA_BYTES: &[u8] = b"#!fake-java\n";

/// Serves all.json with two runtimes: `java-runtime-gamma` installs cleanly,
/// `jre-legacy` lists a file whose size does not match what is served.
async fn manifest_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let index = serde_json::json!({
        platform_key(): {
            "java-runtime-gamma": [{
                "manifest": {"url": format!("{}/gamma.json", base)},
                "version": {"name": "17.0.8", "released": "2023-08-01T00:00:00+00:00"}
            }],
            "jre-legacy": [{
                "manifest": {"url": format!("{}/legacy.json", base)},
                "version": {"name": "8u51"}
            }],
            "java-runtime-delta": []
        }
    });
    let gamma = serde_json::json!({"files": {
        "bin": {"type": "directory"},
        "bin/java": {"type": "file", "executable": true,
            "downloads": {"raw": {"url": format!("{}/raw/java", base), "size": JAVA_BYTES.len()}}},
        "release": {"type": "file",
            "downloads": {"raw": {"url": format!("{}/raw/release", base)}}}
    }});
    let legacy = serde_json::json!({"files": {
        "bin/java": {"type": "file", "executable": true,
            "downloads": {"raw": {"url": format!("{}/raw/java", base), "size": 9999}}}
    }});

    let app = Router::new()
        .route("/all.json", get(move || {
            let body = index.clone();
            async move { Json(body) }
        }))
        .route("/gamma.json", get(move || {
            let body = gamma.clone();
            async move { Json(body) }
        }))
        .route("/legacy.json", get(move || {
            let body = legacy.clone();
            async move { Json(body) }
        }))
        .route("/raw/java", get(|| async { JAVA_BYTES }))
        .route("/raw/release", get(|| async { "JAVA_VERSION=\"17.0.8\"\n" }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

async fn installer() -> (TempDir, Arc<JavaInstaller>) {
    let base = manifest_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let java = JavaInstaller::new(
        reqwest::Client::new(),
        tmp.path().join("java"),
        JavaSettings {
            manifest_url: format!("{}/all.json", base),
            download_concurrency: 2,
        },
    );
    (tmp, java)
}

async fn collect(mut rx: mpsc::Receiver<InstallEvent>) -> Vec<InstallEvent> {
    let mut events = Vec::new();
    timeout(Duration::from_secs(10), async {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
    })
    .await
    .expect("install did not finish");
    events
}

#[tokio::test]
async fn install_reports_progress_then_done() {
    let (_tmp, java) = installer().await;
    assert!(!java.is_installed("java-runtime-gamma"));

    let events = collect(java.install("java-runtime-gamma").unwrap()).await;
    assert!(matches!(events.last(), Some(InstallEvent::Done)));
    match &events[0] {
        InstallEvent::Progress(pending) => {
            assert_eq!(pending.len(), 2);
            assert!(pending.iter().all(|p| !p.completed));
        }
        other => panic!("expected initial progress, got {:?}", other),
    }
    let completed: usize = events
        .iter()
        .skip(1)
        .filter_map(|e| match e {
            InstallEvent::Progress(files) => Some(files.iter().filter(|f| f.completed).count()),
            _ => None,
        })
        .sum();
    assert_eq!(completed, 2);

    assert!(java.is_installed("java-runtime-gamma"));
    assert!(!java.is_installing("java-runtime-gamma"));
    assert_eq!(
        std::fs::read(java.executable("java-runtime-gamma")).unwrap(),
        JAVA_BYTES
    );
    let files = java.list_files("java-runtime-gamma").await.unwrap();
    assert_eq!(files, vec!["bin/java".to_string(), "release".to_string()]);
}

#[cfg(unix)]
#[tokio::test]
async fn executable_files_get_exec_bit() {
    use std::os::unix::fs::PermissionsExt;

    let (_tmp, java) = installer().await;
    collect(java.install("java-runtime-gamma").unwrap()).await;
    let mode = std::fs::metadata(java.executable("java-runtime-gamma"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o111, 0o111);
}

#[tokio::test]
async fn versions_list_current_entries_and_installed_state() {
    let (_tmp, java) = installer().await;
    collect(java.install("java-runtime-gamma").unwrap()).await;

    let versions = java.versions().await.unwrap();
    let runtimes: Vec<&str> = versions.iter().map(|v| v.runtime.as_str()).collect();
    assert_eq!(runtimes, vec!["java-runtime-gamma", "jre-legacy"]);
    assert_eq!(versions[0].version, "17.0.8");
    assert!(versions[0].installed);
    assert_eq!(
        versions[0].executable.as_deref(),
        Some(java.executable("java-runtime-gamma").as_path())
    );
    assert!(!versions[1].installed);
    assert_eq!(versions[1].executable, None);
}

#[tokio::test]
async fn unreachable_manifest_falls_back_to_local_installs() {
    let (tmp, java) = installer().await;
    collect(java.install("java-runtime-gamma").unwrap()).await;

    let offline = JavaInstaller::new(
        reqwest::Client::new(),
        tmp.path().join("java"),
        JavaSettings {
            manifest_url: "http://127.0.0.1:1/all.json".into(),
            download_concurrency: 1,
        },
    );
    let versions = offline.versions().await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].runtime, "java-runtime-gamma");
    assert_eq!(versions[0].version, "17.0.8");
    assert!(versions[0].installed);
}

#[tokio::test]
async fn size_mismatch_fails_and_leaves_nothing_behind() {
    let (tmp, java) = installer().await;
    let events = collect(java.install("jre-legacy").unwrap()).await;
    match events.last() {
        Some(InstallEvent::Error(message)) => assert!(message.contains("expected 9999 bytes")),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(!java.is_installed("jre-legacy"));
    assert!(!tmp.path().join("java/.jre-legacy.partial").exists());
    assert!(!java.is_installing("jre-legacy"));
}

#[tokio::test]
async fn unknown_runtime_reports_error_event() {
    let (_tmp, java) = installer().await;
    let events = collect(java.install("java-runtime-omega").unwrap()).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], InstallEvent::Error(m) if m.contains("not available")));
}

#[tokio::test]
async fn concurrent_install_of_same_runtime_is_rejected() {
    let (_tmp, java) = installer().await;
    let rx = java.install("java-runtime-gamma").unwrap();
    let err = java.install("java-runtime-gamma").unwrap_err();
    assert!(matches!(err, PanelError::InstallFailed(_)));
    let err = java.uninstall("java-runtime-gamma").await.unwrap_err();
    assert!(matches!(err, PanelError::InstallFailed(_)));

    collect(rx).await;
    // slot is released after the task ends
    timeout(Duration::from_secs(5), async {
        while java.is_installing("java-runtime-gamma") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(java.install("java-runtime-gamma").is_ok());
}

#[tokio::test]
async fn uninstall_removes_runtime() {
    let (tmp, java) = installer().await;
    collect(java.install("java-runtime-gamma").unwrap()).await;

    java.uninstall("java-runtime-gamma").await.unwrap();
    assert!(!java.is_installed("java-runtime-gamma"));
    let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("java"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "left behind {:?}", leftovers);

    let err = java.uninstall("java-runtime-gamma").await.unwrap_err();
    assert!(matches!(err, PanelError::NotFound(_)));
    let err = java.list_files("java-runtime-gamma").await.unwrap_err();
    assert!(matches!(err, PanelError::NotFound(_)));
}

#[test]
fn runtime_ids_are_validated() {
    assert!(validate_runtime("java-runtime-gamma").is_ok());
    assert!(validate_runtime("jre-legacy").is_ok());
    for bad in ["", "..", ".hidden", "../etc", "a/b", "with space"] {
        assert!(
            matches!(validate_runtime(bad), Err(PanelError::BadRequest(_))),
            "{} accepted",
            bad
        );
    }
}
