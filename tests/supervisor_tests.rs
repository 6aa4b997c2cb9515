// Process supervisor tests against a shell script standing in for java.
#![cfg(unix)]

mod common;

use common::*;
use mcpanel::error::PanelError;
use mcpanel::models::{ServerStatus, UpdateServerRequest};
use tokio::time::{Duration, Instant};

#[tokio::test]
async fn start_then_stop_transitions_running_to_offline() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    assert_eq!(server.status, ServerStatus::Offline);

    let started = state.supervisor.start(&server.id).await.unwrap();
    assert_eq!(started.status, ServerStatus::Running);
    assert!(state.supervisor.is_running(&server.id));
    wait_for_log(&state, &server.id, "Done").await;

    let stopped = state.supervisor.stop(&server.id).await.unwrap();
    assert_eq!(stopped.status, ServerStatus::Offline);
    assert!(!state.supervisor.is_running(&server.id));
    assert_eq!(stopped.uptime, 0);
}

#[tokio::test]
async fn start_on_running_server_does_not_spawn_again() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    state.supervisor.start(&server.id).await.unwrap();
    let pid = state.supervisor.running()[&server.id].pid;

    let again = state.supervisor.start(&server.id).await.unwrap();
    assert_eq!(again.status, ServerStatus::Running);
    assert_eq!(state.supervisor.running()[&server.id].pid, pid);
    assert_eq!(state.supervisor.running().len(), 1);

    state.supervisor.stop(&server.id).await.unwrap();
}

#[tokio::test]
async fn stop_on_offline_server_is_a_no_op() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    let stopped = state.supervisor.stop(&server.id).await.unwrap();
    assert_eq!(stopped.status, ServerStatus::Offline);
}

#[tokio::test]
async fn commands_reach_stdin_and_output_reaches_the_log_sink() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    state.supervisor.start(&server.id).await.unwrap();

    let seen = state
        .supervisor
        .command_and_wait(&server.id, "say hello", "[Server] say hello", Duration::from_secs(5))
        .await
        .unwrap();
    assert!(seen);
    let lines = state.supervisor.logs(&server.id).snapshot();
    assert!(lines.iter().any(|l| l.contains("[Server] say hello")));

    state.supervisor.stop(&server.id).await.unwrap();
}

#[tokio::test]
async fn send_command_without_process_fails() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    let err = state
        .supervisor
        .send_command(&server.id, "say hi")
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::ProcessNotRunning(_)));
}

#[tokio::test]
async fn unexpected_non_zero_exit_is_a_crash() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    state.supervisor.start(&server.id).await.unwrap();

    state.supervisor.send_command(&server.id, "crash").await.unwrap();
    let crashed = wait_for_status(&state, &server.id, ServerStatus::Crashed).await;
    assert_eq!(crashed.cpu_usage, 0.0);
    wait_for_log(&state, &server.id, "Exception in server tick loop").await;

    let deadline = Instant::now() + Duration::from_secs(5);
    while !state
        .notifications
        .snapshot()
        .iter()
        .any(|n| n.title == "Server crashed")
    {
        assert!(Instant::now() < deadline, "no crash notification");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn kill_is_a_requested_exit() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    state.supervisor.start(&server.id).await.unwrap();

    let killed = state.supervisor.kill(&server.id).await.unwrap();
    assert_eq!(killed.status, ServerStatus::Offline);
    assert!(!state.supervisor.is_running(&server.id));

    let err = state.supervisor.kill(&server.id).await.unwrap_err();
    assert!(matches!(err, PanelError::ProcessNotRunning(_)));
}

#[tokio::test]
async fn restart_replaces_the_process() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "SMP").await;
    state.supervisor.start(&server.id).await.unwrap();
    let first = state.supervisor.running()[&server.id].pid;

    let restarted = state.supervisor.restart(&server.id).await.unwrap();
    assert_eq!(restarted.status, ServerStatus::Running);
    let second = state.supervisor.running()[&server.id].pid;
    assert_ne!(first, second);

    // The first process's exit must not overwrite the new Running status.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        state.registry.get(&server.id).await.unwrap().status,
        ServerStatus::Running
    );
    state.supervisor.stop(&server.id).await.unwrap();
}

#[tokio::test]
async fn stop_kills_a_server_that_ignores_stop_after_the_grace_period() {
    let (dir, state) = test_state().await;
    let stubborn = stubborn_java(dir.path());
    let server = create_server(&state, "Stubborn").await;
    state
        .servers
        .update(
            &server.id,
            UpdateServerRequest {
                java_path: Some(stubborn.display().to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    state.supervisor.start(&server.id).await.unwrap();
    wait_for_log(&state, &server.id, "Done").await;

    let began = Instant::now();
    let stopped = state.supervisor.stop(&server.id).await.unwrap();
    assert!(began.elapsed() >= Duration::from_secs(2));
    assert_eq!(stopped.status, ServerStatus::Offline);
    assert!(!state.supervisor.is_running(&server.id));
}

#[tokio::test]
async fn different_servers_run_side_by_side() {
    let (_dir, state) = test_state().await;
    let a = create_server(&state, "A").await;
    let b = create_server(&state, "B").await;
    let (ra, rb) = tokio::join!(state.supervisor.start(&a.id), state.supervisor.start(&b.id));
    assert_eq!(ra.unwrap().status, ServerStatus::Running);
    assert_eq!(rb.unwrap().status, ServerStatus::Running);
    assert_eq!(state.supervisor.running().len(), 2);

    state.supervisor.stop_all().await;
    assert!(state.supervisor.running().is_empty());
    assert_eq!(state.registry.get(&a.id).await.unwrap().status, ServerStatus::Offline);
    assert_eq!(state.registry.get(&b.id).await.unwrap().status, ServerStatus::Offline);
}

#[tokio::test]
async fn stop_is_bounded_when_a_child_process_keeps_the_console_open() {
    let (dir, state) = test_state().await;
    let java = forking_java(dir.path());
    let server = create_server(&state, "Forking").await;
    use_java(&state, &server.id, &java).await;
    state.supervisor.start(&server.id).await.unwrap();
    wait_for_log(&state, &server.id, "Done").await;

    let stopped = tokio::time::timeout(Duration::from_secs(10), state.supervisor.stop(&server.id))
        .await
        .expect("stop must finish after the grace period")
        .unwrap();
    assert_eq!(stopped.status, ServerStatus::Offline);
    assert!(!state.supervisor.is_running(&server.id));

    // The per-server lock is free again.
    let started = tokio::time::timeout(Duration::from_secs(5), state.supervisor.start(&server.id))
        .await
        .expect("start must not wait on the previous stop")
        .unwrap();
    assert_eq!(started.status, ServerStatus::Running);
    state.supervisor.kill(&server.id).await.unwrap();
}

#[tokio::test]
async fn clean_exit_is_recorded_even_if_a_child_keeps_the_console_open() {
    let (dir, state) = test_state().await;
    let java = leaky_java(dir.path());
    let server = create_server(&state, "Leaky").await;
    use_java(&state, &server.id, &java).await;
    state.supervisor.start(&server.id).await.unwrap();
    wait_for_log(&state, &server.id, "Done").await;

    let stopped = tokio::time::timeout(Duration::from_secs(10), state.supervisor.stop(&server.id))
        .await
        .expect("stop must not wait for the leftover child")
        .unwrap();
    assert_eq!(stopped.status, ServerStatus::Offline);
    assert!(!state.supervisor.is_running(&server.id));
}

#[tokio::test]
async fn concurrent_starts_spawn_one_process() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "Race").await;
    let (a, b) = tokio::join!(
        state.supervisor.start(&server.id),
        state.supervisor.start(&server.id)
    );
    assert_eq!(a.unwrap().status, ServerStatus::Running);
    assert_eq!(b.unwrap().status, ServerStatus::Running);
    assert_eq!(state.supervisor.running().len(), 1);

    let starts = state
        .supervisor
        .logs(&server.id)
        .snapshot()
        .iter()
        .filter(|l| l.starts_with("[panel] starting"))
        .count();
    assert_eq!(starts, 1);
    state.supervisor.stop(&server.id).await.unwrap();
}

#[tokio::test]
async fn start_right_after_stop_waits_for_the_old_process_to_exit() {
    let (_dir, state) = test_state().await;
    let server = create_server(&state, "Bounce").await;
    state.supervisor.start(&server.id).await.unwrap();
    wait_for_log(&state, &server.id, "Done").await;
    let first_pid = state.supervisor.running()[&server.id].pid;

    let (stopped, started) = tokio::join!(
        state.supervisor.stop(&server.id),
        state.supervisor.start(&server.id)
    );
    assert_eq!(stopped.unwrap().status, ServerStatus::Offline);
    assert_eq!(started.unwrap().status, ServerStatus::Running);

    let running = state.supervisor.running();
    assert_eq!(running.len(), 1);
    assert_ne!(running[&server.id].pid, first_pid);

    let lines = state.supervisor.logs(&server.id).snapshot();
    let exited = lines
        .iter()
        .position(|l| l.starts_with("[panel] process exited"))
        .expect("first process exit recorded");
    let second_start = lines
        .iter()
        .rposition(|l| l.starts_with("[panel] starting"))
        .expect("second start recorded");
    assert!(exited < second_start);
    state.supervisor.stop(&server.id).await.unwrap();
}
