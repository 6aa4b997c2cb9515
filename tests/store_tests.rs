// SQLite store: servers, backups and settings, users, sessions, notifications.

use mcpanel::backup::ScheduleSpec;
use mcpanel::models::{
    Backup, BackupKind, BackupManifest, BackupSettings, LoaderType, ManifestEntry, Notification,
    NotificationAction, SenderType, Server, ServerStatus,
};
use mcpanel::store::Store;
use tempfile::TempDir;

async fn store() -> (TempDir, Store) {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::connect(&tmp.path().join("nested/panel.db"))
        .await
        .unwrap();
    store.init().await.unwrap();
    (tmp, store)
}

fn server(id: &str, created_at: i64) -> Server {
    Server {
        id: id.into(),
        name: format!("server {}", id),
        owner: "alice".into(),
        members: vec!["bob".into()],
        created_at,
        updated_at: created_at,
        instance: None,
        size: 0,
        auto_start: false,
        min_ram: 1024,
        max_ram: 2048,
        executable: "server.jar".into(),
        minecraft_arguments: "nogui".into(),
        java_arguments: String::new(),
        java_path: None,
        minecraft_version: "1.20.4".into(),
        loader_type: LoaderType::Fabric,
        loader_version: "0.15.7".into(),
        directory: format!("/srv/{}", id),
        port: 25565,
        status: ServerStatus::Offline,
        uptime: 0,
        cpu_usage: 0.0,
        memory_usage: 0,
    }
}

fn backup(id: &str, server_id: &str, kind: BackupKind, created_at: i64) -> Backup {
    Backup {
        id: id.into(),
        server_id: server_id.into(),
        kind,
        created_at,
        size: 100,
        file_count: 2,
        description: String::new(),
    }
}

fn manifest(paths: &[&str]) -> BackupManifest {
    BackupManifest {
        entries: paths
            .iter()
            .map(|p| ManifestEntry {
                path: p.to_string(),
                size: 1,
                modified: 7,
                sha256: "00".into(),
            })
            .collect(),
        deleted: vec![],
    }
}

#[tokio::test]
async fn init_is_idempotent() {
    let (_tmp, store) = store().await;
    store.init().await.unwrap();
    assert!(store.list_servers().await.unwrap().is_empty());
}

#[tokio::test]
async fn servers_persist_without_runtime_fields() {
    let (_tmp, store) = store().await;
    let mut running = server("b", 20);
    running.status = ServerStatus::Running;
    running.uptime = 30;
    running.size = 4096;
    store.save_server(&running).await.unwrap();
    store.save_server(&server("a", 10)).await.unwrap();

    let servers = store.list_servers().await.unwrap();
    let ids: Vec<&str> = servers.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    let b = &servers[1];
    assert_eq!(b.status, ServerStatus::Offline);
    assert_eq!(b.uptime, 0);
    assert_eq!(b.size, 0);
    assert_eq!(b.members, vec!["bob".to_string()]);
    assert_eq!(b.loader_type, LoaderType::Fabric);

    let mut renamed = server("a", 10);
    renamed.name = "renamed".into();
    renamed.java_path = Some("/opt/java/bin/java".into());
    store.save_server(&renamed).await.unwrap();
    let servers = store.list_servers().await.unwrap();
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0], renamed);
}

#[tokio::test]
async fn backups_keep_order_and_manifests() {
    let (_tmp, store) = store().await;
    store
        .insert_backup(&backup("b1", "s", BackupKind::Full, 100), &manifest(&["a", "b"]))
        .await
        .unwrap();
    store
        .insert_backup(&backup("b2", "s", BackupKind::Incremental, 100), &manifest(&["a"]))
        .await
        .unwrap();
    store
        .insert_backup(&backup("other", "t", BackupKind::Full, 50), &manifest(&[]))
        .await
        .unwrap();

    let list = store.list_backups("s").await.unwrap();
    let ids: Vec<&str> = list.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["b1", "b2"]);
    assert_eq!(list[1].kind, BackupKind::Incremental);

    assert_eq!(store.backup_manifest("b1").await.unwrap(), manifest(&["a", "b"]));
    assert!(matches!(
        store.backup_manifest("missing").await,
        Err(mcpanel::error::PanelError::NotFound(_))
    ));

    store
        .promote_backup("b2", 300, 5, &manifest(&["a", "c"]))
        .await
        .unwrap();
    let promoted = &store.list_backups("s").await.unwrap()[1];
    assert_eq!(promoted.kind, BackupKind::Full);
    assert_eq!((promoted.size, promoted.file_count), (300, 5));
    assert_eq!(store.backup_manifest("b2").await.unwrap(), manifest(&["a", "c"]));

    store.delete_backup("b1").await.unwrap();
    assert_eq!(store.list_backups("s").await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_a_server_drops_its_backups_and_settings() {
    let (_tmp, store) = store().await;
    store.save_server(&server("s", 1)).await.unwrap();
    store
        .insert_backup(&backup("b1", "s", BackupKind::Full, 1), &manifest(&["a"]))
        .await
        .unwrap();
    let settings = BackupSettings {
        schedule: Some(ScheduleSpec::Cron {
            expression: "0 3 * * *".into(),
        }),
        kind: BackupKind::Incremental,
        slots: 4,
        exclusions: vec!["logs".into()],
    };
    store.save_backup_settings("s", &settings).await.unwrap();
    assert_eq!(store.backup_settings("s").await.unwrap(), Some(settings));

    store.delete_server("s").await.unwrap();
    assert!(store.list_servers().await.unwrap().is_empty());
    assert!(store.list_backups("s").await.unwrap().is_empty());
    assert_eq!(store.backup_settings("s").await.unwrap(), None);
}

#[tokio::test]
async fn users_and_sessions() {
    let (_tmp, store) = store().await;
    assert_eq!(store.count_users().await.unwrap(), 0);
    store.insert_user("alice", "hash", true, 1).await.unwrap();
    assert!(store.insert_user("alice", "other", false, 2).await.is_err());
    assert_eq!(store.count_users().await.unwrap(), 1);

    let user = store.find_user("alice").await.unwrap().unwrap();
    assert_eq!(user.password_hash, "hash");
    assert!(user.admin);
    assert!(store.find_user("bob").await.unwrap().is_none());

    store.insert_session("old", "alice", 1_000).await.unwrap();
    store.insert_session("new", "alice", 5_000).await.unwrap();
    assert_eq!(
        store.find_session("new").await.unwrap(),
        Some(("alice".to_string(), 5_000))
    );
    assert_eq!(store.prune_sessions(2_000).await.unwrap(), 1);
    assert_eq!(store.find_session("old").await.unwrap(), None);

    store.delete_session("new").await.unwrap();
    assert_eq!(store.find_session("new").await.unwrap(), None);
}

#[tokio::test]
async fn notifications_newest_first_with_flags() {
    let (_tmp, store) = store().await;
    let make = |id: &str, date: i64| Notification {
        id: id.into(),
        title: "Server crashed".into(),
        message: "exit code 1".into(),
        read: false,
        archived: false,
        action: vec![NotificationAction {
            label: "Open".into(),
            href: "/server/s".into(),
        }],
        sender: "s".into(),
        sender_type: SenderType::Server,
        date,
    };
    store.insert_notification(&make("n1", 10)).await.unwrap();
    store.insert_notification(&make("n2", 20)).await.unwrap();

    let list = store.list_notifications().await.unwrap();
    assert_eq!(list, vec![make("n2", 20), make("n1", 10)]);

    assert!(store.set_notification_flags("n1", true, true).await.unwrap());
    assert!(!store.set_notification_flags("missing", true, false).await.unwrap());
    let n1 = store
        .list_notifications()
        .await
        .unwrap()
        .into_iter()
        .find(|n| n.id == "n1")
        .unwrap();
    assert!(n1.read && n1.archived);
}
