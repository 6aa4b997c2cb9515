// Backup engine: full/incremental archives, retention with rebasing, restore, job exclusivity.

mod common;

use common::*;
use mcpanel::backup::ScheduleSpec;
use mcpanel::error::PanelError;
use mcpanel::models::{BackupKind, BackupSettings, ServerStatus};
use std::path::Path;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn read(root: &Path, rel: &str) -> Option<String> {
    std::fs::read_to_string(root.join(rel)).ok()
}

fn settings(slots: u32, schedule: Option<ScheduleSpec>) -> BackupSettings {
    BackupSettings {
        schedule,
        kind: BackupKind::Incremental,
        slots,
        exclusions: vec!["logs".into()],
    }
}

#[tokio::test]
async fn incremental_without_a_full_backup_is_rejected() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    let err = state
        .backups
        .create_manual_backup(&server.id, BackupKind::Incremental, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::NoFullBackup));
    assert!(state.backups.list(&server.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn full_backup_writes_an_artifact_and_skips_exclusions() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    let root = Path::new(&server.directory);
    write(root, "world/level.dat", "level");
    write(root, "logs/latest.log", "noise");

    let backup = state
        .backups
        .create_manual_backup(&server.id, BackupKind::Full, Some("first".into()))
        .await
        .unwrap();
    assert_eq!(backup.kind, BackupKind::Full);
    assert_eq!(backup.description, "first");
    assert!(backup.size > 0);
    assert!(state.backups.artifact_path(&server.id, &backup.id).exists());

    // server.properties, eula.txt and world/level.dat; logs/ is excluded.
    assert_eq!(backup.file_count, 3);
}

#[tokio::test]
async fn incremental_stores_only_changed_files() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    let root = Path::new(&server.directory);
    write(root, "world/level.dat", "v1");
    write(root, "world/region/r.0.0.mca", "region");
    state
        .backups
        .create_manual_backup(&server.id, BackupKind::Full, None)
        .await
        .unwrap();

    write(root, "world/level.dat", "v2");
    let incremental = state
        .backups
        .create_manual_backup(&server.id, BackupKind::Incremental, None)
        .await
        .unwrap();
    assert_eq!(incremental.kind, BackupKind::Incremental);
    assert_eq!(incremental.file_count, 1);
}

#[tokio::test]
async fn retention_keeps_slots_and_the_oldest_retained_backup_is_full() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    state
        .backups
        .configure_schedule(&server.id, settings(3, None))
        .await
        .unwrap();
    let root = Path::new(&server.directory);

    write(root, "world/level.dat", "v0");
    let full = state
        .backups
        .create_manual_backup(&server.id, BackupKind::Full, None)
        .await
        .unwrap();
    for i in 1..=3 {
        write(root, "world/level.dat", &format!("v{}", i));
        write(root, &format!("world/data/{}.dat", i), "x");
        state
            .backups
            .create_manual_backup(&server.id, BackupKind::Incremental, None)
            .await
            .unwrap();
    }

    let backups = state.backups.list(&server.id).await.unwrap();
    assert_eq!(backups.len(), 3);
    assert!(backups.iter().all(|b| b.id != full.id));
    assert_eq!(backups[0].kind, BackupKind::Full);
    assert_eq!(backups[1].kind, BackupKind::Incremental);
    assert!(!state.backups.artifact_path(&server.id, &full.id).exists());

    // The rebased backup restores to the state it was taken at.
    state.backups.restore(&server.id, &backups[0].id).await.unwrap();
    assert_eq!(read(root, "world/level.dat").as_deref(), Some("v1"));
    assert!(read(root, "world/data/1.dat").is_some());
    assert!(read(root, "world/data/2.dat").is_none());
}

#[tokio::test]
async fn restore_replays_the_chain_including_deletions() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    let root = Path::new(&server.directory);

    write(root, "world/level.dat", "v1");
    write(root, "world/old.dat", "old");
    state
        .backups
        .create_manual_backup(&server.id, BackupKind::Full, None)
        .await
        .unwrap();

    write(root, "world/level.dat", "v2");
    std::fs::remove_file(root.join("world/old.dat")).unwrap();
    let target = state
        .backups
        .create_manual_backup(&server.id, BackupKind::Incremental, None)
        .await
        .unwrap();

    write(root, "world/level.dat", "v3");
    write(root, "world/new.dat", "new");
    write(root, "logs/latest.log", "log");

    let restored = state.backups.restore(&server.id, &target.id).await.unwrap();
    assert_eq!(restored.status, ServerStatus::Offline);
    assert_eq!(read(root, "world/level.dat").as_deref(), Some("v2"));
    assert!(read(root, "world/old.dat").is_none());
    assert!(read(root, "world/new.dat").is_none());
    // Excluded paths are not in any backup, so restore leaves them alone.
    assert_eq!(read(root, "logs/latest.log").as_deref(), Some("log"));
    assert!(read(root, "server.properties").is_some());
}

#[tokio::test]
async fn deleting_a_full_backup_rebases_its_incremental_successor() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    let root = Path::new(&server.directory);
    write(root, "world/level.dat", "v1");
    let full = state
        .backups
        .create_manual_backup(&server.id, BackupKind::Full, None)
        .await
        .unwrap();
    write(root, "world/level.dat", "v2");
    let incremental = state
        .backups
        .create_manual_backup(&server.id, BackupKind::Incremental, None)
        .await
        .unwrap();

    state.backups.delete(&server.id, &full.id).await.unwrap();
    let backups = state.backups.list(&server.id).await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].id, incremental.id);
    assert_eq!(backups[0].kind, BackupKind::Full);

    let err = state.backups.delete(&server.id, &full.id).await.unwrap_err();
    assert!(matches!(err, PanelError::NotFound(_)));
}

#[tokio::test]
async fn second_job_on_the_same_server_is_busy() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    let _job = state.registry.locks().begin_job(&server.id).unwrap();

    let err = state
        .backups
        .create_manual_backup(&server.id, BackupKind::Full, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::ServerBusy(_)));
    let err = state.backups.restore(&server.id, "missing").await.unwrap_err();
    assert!(matches!(err, PanelError::ServerBusy(_)));
}

#[tokio::test]
async fn invalid_schedules_and_slots_are_rejected() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;

    let err = state
        .backups
        .configure_schedule(&server.id, settings(3, Some(ScheduleSpec::cron("every tuesday"))))
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::ScheduleInvalid(_)));

    let err = state
        .backups
        .configure_schedule(&server.id, settings(3, Some(ScheduleSpec::interval(0, 0, 0))))
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::ScheduleInvalid(_)));

    let err = state
        .backups
        .configure_schedule(&server.id, settings(0, None))
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::BadRequest(_)));
    assert_eq!(state.backups.scheduled_count(), 0);
}

#[tokio::test]
async fn valid_schedule_arms_and_replaces_the_scheduler() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;

    let saved = state
        .backups
        .configure_schedule(&server.id, settings(5, Some(ScheduleSpec::cron("0 4 * * *"))))
        .await
        .unwrap();
    assert_eq!(saved.slots, 5);
    assert_eq!(state.backups.scheduled_count(), 1);
    assert_eq!(state.backups.settings(&server.id).await.unwrap(), saved);

    state
        .backups
        .configure_schedule(&server.id, settings(5, Some(ScheduleSpec::interval(0, 6, 0))))
        .await
        .unwrap();
    assert_eq!(state.backups.scheduled_count(), 1);

    state
        .backups
        .configure_schedule(&server.id, settings(5, None))
        .await
        .unwrap();
    assert_eq!(state.backups.scheduled_count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn running_server_is_paused_around_the_snapshot() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    state.supervisor.start(&server.id).await.unwrap();
    wait_for_log(&state, &server.id, "Done").await;

    state
        .backups
        .create_manual_backup(&server.id, BackupKind::Full, None)
        .await
        .unwrap();
    wait_for_log(&state, &server.id, "[Server] save-on").await;
    let lines = state.supervisor.logs(&server.id).snapshot();
    let off = lines.iter().position(|l| l.contains("[Server] save-off")).unwrap();
    let saved = lines.iter().position(|l| l.contains("Saved the game")).unwrap();
    let on = lines.iter().position(|l| l.contains("[Server] save-on")).unwrap();
    assert!(off < saved && saved < on);

    state.supervisor.stop(&server.id).await.unwrap();
}

#[tokio::test]
async fn hourly_schedule_with_three_slots_keeps_three_artifacts() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    state
        .backups
        .configure_schedule(&server.id, settings(3, Some(ScheduleSpec::cron("0 * * * *"))))
        .await
        .unwrap();
    let root = Path::new(&server.directory);

    let mut taken = Vec::new();
    for i in 0..4 {
        write(root, "world/level.dat", &format!("tick {}", i));
        taken.push(state.backups.run_scheduled(&server.id).await.unwrap());
    }
    assert_eq!(taken[0].kind, BackupKind::Full);
    assert_eq!(taken[1].kind, BackupKind::Incremental);

    let kept = state.backups.list(&server.id).await.unwrap();
    let kept_ids: Vec<&str> = kept.iter().map(|b| b.id.as_str()).collect();
    let newest: Vec<&str> = taken[1..].iter().map(|b| b.id.as_str()).collect();
    assert_eq!(kept_ids, newest);
    assert_eq!(kept[0].kind, BackupKind::Full);
    assert!(!state.backups.artifact_path(&server.id, &taken[0].id).exists());
    for backup in &kept {
        assert!(state.backups.artifact_path(&server.id, &backup.id).is_file());
    }
}
