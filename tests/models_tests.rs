// Wire shapes of the public models.

use mcpanel::backup::ScheduleSpec;
use mcpanel::models::*;
use serde_json::json;

#[test]
fn server_status_and_loader_serialize_as_variant_names() {
    assert_eq!(json!(ServerStatus::Running), json!("Running"));
    assert_eq!(json!(ServerStatus::Crashed), json!("Crashed"));
    assert_eq!(json!(LoaderType::NeoForge), json!("NeoForge"));
    for loader in LoaderType::ALL {
        assert_eq!(LoaderType::parse(loader.as_str()), Some(loader));
        assert_eq!(LoaderType::parse(&loader.as_str().to_uppercase()), Some(loader));
    }
    assert_eq!(LoaderType::parse("bukkit"), None);
}

#[test]
fn create_request_fills_defaults() {
    let req: CreateServerRequest = serde_json::from_value(json!({
        "name": "SMP",
        "minecraft_version": "1.20.4"
    }))
    .unwrap();
    assert_eq!(req.port, 25565);
    assert_eq!(req.difficulty, "easy");
    assert_eq!(req.gamemode, "survival");
    assert_eq!(req.max_players, 20);
    assert_eq!((req.min_ram, req.max_ram), (1024, 2048));
    assert_eq!(req.loader, LoaderType::Vanilla);
    assert!(!req.auto_start);
    assert!(serde_json::from_value::<CreateServerRequest>(json!({"name": "x"})).is_err());
}

#[test]
fn update_request_leaves_absent_fields_unset() {
    let req: UpdateServerRequest =
        serde_json::from_value(json!({"name": "new", "members": ["bob"]})).unwrap();
    assert_eq!(req.name.as_deref(), Some("new"));
    assert_eq!(req.members, Some(vec!["bob".to_string()]));
    assert!(req.auto_start.is_none());
    assert!(req.max_ram.is_none());
}

#[test]
fn server_visibility_and_runtime_reset() {
    let mut server: Server = serde_json::from_value(json!({
        "id": "s1",
        "name": "SMP",
        "owner": "alice",
        "members": ["bob"],
        "created_at": 1,
        "updated_at": 1,
        "auto_start": false,
        "min_ram": 1024,
        "max_ram": 2048,
        "executable": "server.jar",
        "minecraft_version": "1.20.4",
        "loader_type": "Vanilla",
        "directory": "/srv/s1",
        "port": 25565,
        "status": "Running",
        "uptime": 12,
        "cpu_usage": 3.5,
        "memory_usage": 1000
    }))
    .unwrap();
    assert!(server.is_visible_to("alice", false));
    assert!(server.is_visible_to("bob", false));
    assert!(!server.is_visible_to("carol", false));
    assert!(server.is_visible_to("carol", true));

    server.reset_runtime(ServerStatus::Crashed);
    assert_eq!(server.status, ServerStatus::Crashed);
    assert_eq!(server.uptime, 0);
    assert_eq!(server.cpu_usage, 0.0);
    assert_eq!(server.memory_usage, 0);
}

#[test]
fn file_item_uses_type_key_and_uppercase_category() {
    let item = FileItem {
        name: "server.properties".into(),
        path: "server.properties".into(),
        is_dir: false,
        size: 12,
        type_: "Text File".into(),
        mime: "text/plain".into(),
        category: FileCategory::Text,
        last_modified: Some(5),
        created: None,
    };
    let value = json!(item);
    assert_eq!(value["type"], "Text File");
    assert_eq!(value["category"], "TEXT");
    assert!(value.get("type_").is_none());
}

#[test]
fn install_events_are_tagged() {
    let progress = InstallEvent::Progress(vec![InstallProgress {
        file: "bin/java".into(),
        completed: true,
    }]);
    assert_eq!(
        json!(progress),
        json!({"type": "progress", "data": [{"file": "bin/java", "completed": true}]})
    );
    assert_eq!(json!(InstallEvent::Done), json!({"type": "done"}));
    assert_eq!(InstallEvent::Error("x".into()).name(), "error");
    assert!(InstallEvent::Done.is_terminal());
    assert!(!progress.is_terminal());
}

#[test]
fn notifications_are_camel_case() {
    let n = Notification {
        id: "n1".into(),
        title: "Server crashed".into(),
        message: "exit code 1".into(),
        read: false,
        archived: false,
        action: vec![],
        sender: "s1".into(),
        sender_type: SenderType::Server,
        date: 9,
    };
    let value = json!(n);
    assert_eq!(value["senderType"], "server");
    assert!(value.get("sender_type").is_none());
    assert_eq!(SenderType::parse("anything"), SenderType::System);
}

#[test]
fn backup_settings_shape() {
    let settings: BackupSettings = serde_json::from_value(json!({
        "schedule": {"type": "interval", "hours": 6},
        "slots": 5
    }))
    .unwrap();
    assert_eq!(settings.schedule, Some(ScheduleSpec::interval(0, 6, 0)));
    assert_eq!(settings.kind, BackupKind::Full);
    assert!(settings.exclusions.is_empty());
    assert_eq!(json!(BackupKind::Incremental), json!("incremental"));

    let manual: CreateBackupRequest = serde_json::from_value(json!({})).unwrap();
    assert_eq!(manual.kind, BackupKind::Full);
    assert_eq!(manual.description, None);
}

#[test]
fn manifest_lookup_by_path() {
    let manifest = BackupManifest {
        entries: ["a.txt", "b/c.dat", "world/level.dat"]
            .iter()
            .map(|p| ManifestEntry {
                path: p.to_string(),
                size: 1,
                modified: 0,
                sha256: String::new(),
            })
            .collect(),
        deleted: vec![],
    };
    assert!(manifest.get("b/c.dat").is_some());
    assert!(manifest.get("b").is_none());
}

#[test]
fn discover_query_defaults() {
    let query: DiscoverQuery = serde_json::from_value(json!({"search": "sky"})).unwrap();
    assert_eq!(query.limit, 20);
    assert_eq!(query.offset, 0);
    assert_eq!(query.platform, Platform::All);
    assert_eq!(query.sort, DiscoverSort::Relevance);

    let query: DiscoverQuery =
        serde_json::from_value(json!({"platform": "CurseForge", "sort": "downloads"})).unwrap();
    assert_eq!(query.platform, Platform::CurseForge);
    assert_eq!(query.sort, DiscoverSort::Downloads);
}

#[test]
fn login_request_remember_defaults_off() {
    let req: LoginRequest =
        serde_json::from_value(json!({"username": "a", "password": "b"})).unwrap();
    assert!(!req.remember);
}
