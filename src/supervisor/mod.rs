// Process supervisor: at most one OS process per server, one worker task per process.
// start/stop/restart/kill hold the per-server lock; the `*_locked` variants expect the
// caller to hold it already (backup and restore).

mod command;
mod log_sink;
mod process;
mod stats;

pub use command::{build as build_command, split_args};
pub use log_sink::LogSink;
pub use stats::{ProcessStats, ProcessUsage};

use crate::error::{PanelError, Result};
use crate::models::{Server, ServerStatus};
use crate::notifications::NotificationCenter;
use crate::registry::ServerRegistry;
use process::{ExitInfo, ProcessHandle, ProcessWorker};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub stop_grace: Duration,
    pub log_buffer_lines: usize,
    pub default_java_path: String,
}

impl From<&crate::config::SupervisorConfig> for SupervisorSettings {
    fn from(c: &crate::config::SupervisorConfig) -> Self {
        Self {
            stop_grace: Duration::from_secs(c.stop_grace_secs),
            log_buffer_lines: c.log_buffer_lines,
            default_java_path: c.default_java_path.clone(),
        }
    }
}

/// A live process as seen by the stats worker.
#[derive(Debug, Clone, Copy)]
pub struct RunningInfo {
    pub pid: Option<u32>,
    pub started_at: Instant,
}

pub struct Supervisor {
    registry: Arc<ServerRegistry>,
    notifications: Arc<NotificationCenter>,
    processes: Mutex<HashMap<String, ProcessHandle>>,
    sinks: Mutex<HashMap<String, Arc<LogSink>>>,
    generation: AtomicU64,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(
        registry: Arc<ServerRegistry>,
        notifications: Arc<NotificationCenter>,
        settings: SupervisorSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            notifications,
            processes: Mutex::new(HashMap::new()),
            sinks: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            settings,
        })
    }

    fn processes(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProcessHandle>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, server_id: &str) -> Option<ProcessHandle> {
        self.processes().get(server_id).cloned()
    }

    /// Console buffer of a server (created on first use).
    pub fn logs(&self, server_id: &str) -> Arc<LogSink> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(server_id.to_string())
            .or_insert_with(|| Arc::new(LogSink::new(self.settings.log_buffer_lines)))
            .clone()
    }

    pub fn is_running(&self, server_id: &str) -> bool {
        self.processes().contains_key(server_id)
    }

    pub fn running(&self) -> HashMap<String, RunningInfo> {
        self.processes()
            .iter()
            .map(|(id, h)| {
                (
                    id.clone(),
                    RunningInfo {
                        pid: h.pid,
                        started_at: h.started_at,
                    },
                )
            })
            .collect()
    }

    async fn set_status(&self, server_id: &str, status: ServerStatus) -> Option<Server> {
        self.registry
            .update_runtime(server_id, |s| s.reset_runtime(status))
            .await
    }

    pub async fn start(self: &Arc<Self>, server_id: &str) -> Result<Server> {
        let _guard = self.registry.locks().acquire(server_id).await;
        self.start_locked(server_id).await
    }

    /// No-op returning the current state when a process already exists.
    pub async fn start_locked(self: &Arc<Self>, server_id: &str) -> Result<Server> {
        let server = self.registry.get(server_id).await?;
        if self.is_running(server_id) {
            return Ok(server);
        }
        let (program, args) = command::build(&server, &self.settings.default_java_path);
        let cwd = PathBuf::from(&server.directory);
        let sink = self.logs(server_id);
        sink.push(format!("[panel] starting: {} {}", program, args.join(" ")));

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (handle, worker) = match process::spawn(&program, &args, &cwd, sink.clone(), generation) {
            Ok(pair) => pair,
            Err(e) => {
                sink.push(format!("[panel] {}", e));
                self.set_status(server_id, ServerStatus::Crashed).await;
                return Err(e);
            }
        };
        tracing::info!(server_id, pid = ?handle.pid, program = %program, "server process started");
        self.processes().insert(server_id.to_string(), handle);

        let this = self.clone();
        let id = server_id.to_string();
        tokio::spawn(async move { this.supervise(id, generation, worker).await });

        let server = self
            .set_status(server_id, ServerStatus::Running)
            .await
            .ok_or_else(|| PanelError::NotFound(format!("server {}", server_id)))?;
        Ok(server)
    }

    /// Worker task body: waits for exit, records the outcome, then signals waiters.
    /// The status is written before the handle leaves the map, so a later start never
    /// has its Running status overwritten.
    async fn supervise(self: Arc<Self>, server_id: String, generation: u64, mut worker: ProcessWorker) {
        let exit: ExitInfo = worker.wait().await;
        let crashed = exit.crashed();
        tracing::info!(server_id = %server_id, code = ?exit.code, requested = exit.requested, crashed, "server process exited");
        self.logs(&server_id).push(match exit.code {
            Some(code) => format!("[panel] process exited with code {}", code),
            None => "[panel] process terminated".to_string(),
        });

        let classified = if crashed {
            ServerStatus::Crashed
        } else {
            ServerStatus::Offline
        };
        let updated = self
            .registry
            .update_runtime(&server_id, |s| {
                let status = if exit.requested && s.status == ServerStatus::Restarting {
                    ServerStatus::Restarting
                } else {
                    classified
                };
                s.reset_runtime(status);
            })
            .await;
        if let Some(server) = &updated {
            if crashed {
                self.notifications
                    .server_event(
                        &server_id,
                        &server.name,
                        "Server crashed",
                        format!(
                            "{} exited unexpectedly (code {})",
                            server.name,
                            exit.code.map(|c| c.to_string()).unwrap_or_else(|| "none".into())
                        ),
                    )
                    .await;
            }
        }

        {
            let mut processes = self.processes();
            if processes.get(&server_id).map(|h| h.generation) == Some(generation) {
                processes.remove(&server_id);
            }
        }
        let _ = worker.exited_tx.send(true);
    }

    /// Idempotent: returns the current state when nothing is running.
    pub async fn stop(&self, server_id: &str) -> Result<Server> {
        let _guard = self.registry.locks().acquire(server_id).await;
        self.stop_locked(server_id).await
    }

    /// Sends `stop`, waits for the grace period, then kills. Returns after the process
    /// has fully exited.
    pub async fn stop_locked(&self, server_id: &str) -> Result<Server> {
        let Some(handle) = self.handle(server_id) else {
            return self.registry.get(server_id).await;
        };
        handle.request_stop();
        if handle.send_line("stop".into()).await {
            if tokio::time::timeout(self.settings.stop_grace, handle.wait_exited())
                .await
                .is_err()
            {
                tracing::warn!(server_id, grace_secs = self.settings.stop_grace.as_secs(), "server ignored stop, killing");
                handle.kill();
                handle.wait_exited().await;
            }
        } else {
            handle.kill();
            handle.wait_exited().await;
        }
        self.registry.get(server_id).await
    }

    pub async fn kill(&self, server_id: &str) -> Result<Server> {
        let _guard = self.registry.locks().acquire(server_id).await;
        let handle = self
            .handle(server_id)
            .ok_or_else(|| PanelError::ProcessNotRunning(server_id.to_string()))?;
        tracing::info!(server_id, "killing server process");
        handle.kill();
        handle.wait_exited().await;
        self.registry.get(server_id).await
    }

    pub async fn restart(self: &Arc<Self>, server_id: &str) -> Result<Server> {
        let _guard = self.registry.locks().acquire(server_id).await;
        self.registry.get(server_id).await?;
        self.set_status(server_id, ServerStatus::Restarting).await;
        self.stop_locked(server_id).await?;
        self.start_locked(server_id).await
    }

    pub async fn send_command(&self, server_id: &str, text: &str) -> Result<()> {
        let handle = self
            .handle(server_id)
            .ok_or_else(|| PanelError::ProcessNotRunning(server_id.to_string()))?;
        let line = text.trim_end_matches(['\r', '\n']).to_string();
        if !handle.send_line(line).await {
            return Err(PanelError::ProcessNotRunning(server_id.to_string()));
        }
        Ok(())
    }

    /// Sends a console command and waits for an output line containing `needle`.
    /// Returns false on timeout.
    pub async fn command_and_wait(
        &self,
        server_id: &str,
        text: &str,
        needle: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let mut rx = self.logs(server_id).subscribe();
        self.send_command(server_id, text).await?;
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(line) if line.contains(needle) => return true,
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return false,
                }
            }
        };
        Ok(tokio::time::timeout(timeout, wait).await.unwrap_or(false))
    }

    /// Starts every server flagged `auto_start`; failures are logged.
    pub async fn auto_start(self: &Arc<Self>) {
        for server in self.registry.list().await {
            if !server.auto_start {
                continue;
            }
            if let Err(e) = self.start(&server.id).await {
                tracing::warn!(error = %e, server_id = %server.id, operation = "auto_start", "auto start failed");
            }
        }
    }

    /// Stops all running servers concurrently (panel shutdown).
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.processes().keys().cloned().collect();
        let stops = ids.iter().map(|id| async move {
            if let Err(e) = self.stop(id).await {
                tracing::warn!(error = %e, server_id = %id, operation = "stop_all", "stop failed");
            }
        });
        futures_util::future::join_all(stops).await;
    }

    /// Drops the console buffer of a deleted server.
    pub fn forget(&self, server_id: &str) {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id);
    }
}
