// Background monitoring worker.
// Samples running processes into the registry, refreshes directory sizes, prunes idle
// state subscribers and expired sessions, and logs app stats.

use crate::auth::AuthService;
use crate::broadcaster::StateBroadcaster;
use crate::models::ServerStatus;
use crate::registry::ServerRegistry;
use crate::servers::ServerService;
use crate::supervisor::{ProcessStats, Supervisor};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{Duration, interval};

/// Services and shutdown for the worker.
pub struct WorkerDeps {
    pub registry: Arc<ServerRegistry>,
    pub supervisor: Arc<Supervisor>,
    pub broadcaster: Arc<StateBroadcaster>,
    pub servers: Arc<ServerService>,
    pub auth: Arc<AuthService>,
    pub stats: Arc<ProcessStats>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// Worker timing config. Every interval is independent of the others.
pub struct WorkerConfig {
    pub sample_interval_ms: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
    pub size_refresh_interval_secs: u64,
    /// How often idle subscribers and expired sessions are dropped.
    pub prune_interval_secs: u64,
}

impl WorkerConfig {
    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self {
            sample_interval_ms: config.monitoring.sample_interval_ms,
            stats_log_interval_secs: config.monitoring.stats_log_interval_secs,
            size_refresh_interval_secs: config.monitoring.size_refresh_interval_secs,
            prune_interval_secs: config.broadcaster.ping_interval_secs,
        }
    }
}

/// Writes uptime, CPU and memory of every live process into the registry (which publishes
/// the changes). Servers that are not `Running` (restarting, stopping) are left alone.
/// Returns how many servers were sampled.
pub async fn sample_running(
    supervisor: &Supervisor,
    registry: &ServerRegistry,
    stats: &ProcessStats,
) -> usize {
    let running = supervisor.running();
    if running.is_empty() {
        return 0;
    }
    let pids: Vec<u32> = running.values().filter_map(|r| r.pid).collect();
    let usage = match stats.sample(pids).await {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(error = %e, operation = "sample_processes", "process stats failed");
            HashMap::new()
        }
    };

    let mut sampled = 0;
    for (id, info) in running {
        let uptime = info.started_at.elapsed().as_secs();
        let sample = info.pid.and_then(|pid| usage.get(&pid)).copied();
        let updated = registry
            .update_runtime(&id, |s| {
                if s.status != ServerStatus::Running {
                    return;
                }
                s.uptime = uptime;
                if let Some(sample) = sample {
                    s.cpu_usage = sample.cpu;
                    s.memory_usage = sample.memory;
                }
            })
            .await;
        if updated.is_some() {
            sampled += 1;
        }
    }
    sampled
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        registry,
        supervisor,
        broadcaster,
        servers,
        auth,
        stats,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        sample_interval_ms,
        stats_log_interval_secs,
        size_refresh_interval_secs,
        prune_interval_secs,
    } = config;

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_millis(sample_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut size_tick = interval(Duration::from_secs(size_refresh_interval_secs));
        size_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut prune_tick = interval(Duration::from_secs(prune_interval_secs));
        prune_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut subscribers_pruned_total: u64 = 0;
        let mut sessions_pruned_total: u64 = 0;

        let worker_span = tracing::span!(tracing::Level::DEBUG, "worker", sample_interval_ms);
        let _guard = worker_span.enter();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    sample_running(&supervisor, &registry, &stats).await;
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Worker shutting down");
                    break;
                }
                _ = size_tick.tick() => {
                    servers.refresh_sizes().await;
                }
                _ = prune_tick.tick() => {
                    let pruned = broadcaster.prune_idle();
                    if pruned > 0 {
                        tracing::debug!(operation = "prune_idle", pruned, "idle state subscribers dropped");
                        subscribers_pruned_total += pruned as u64;
                    }
                    match auth.prune_sessions().await {
                        Ok(n) => sessions_pruned_total += n,
                        Err(e) => tracing::warn!(
                            error = %e,
                            operation = "prune_sessions",
                            "Failed to prune sessions"
                        ),
                    }
                }
                _ = stats_log_tick.tick() => {
                    let server_count = registry.list().await.len();
                    tracing::info!(
                        servers = server_count,
                        running_servers = supervisor.running().len(),
                        state_subscribers = broadcaster.total_subscribers(),
                        subscribers_pruned_total,
                        sessions_pruned_total,
                        "app stats"
                    );
                }
            }
        }
    })
}
