// Per-process CPU and memory via sysinfo.

use std::collections::HashMap;
use std::sync::Arc;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    /// Percent of one core (may exceed 100 on multi-core).
    pub cpu: f32,
    /// Resident memory in bytes.
    pub memory: u64,
}

pub struct ProcessStats {
    sys: Arc<std::sync::Mutex<System>>,
}

impl Default for ProcessStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessStats {
    pub fn new() -> Self {
        Self {
            sys: Arc::new(std::sync::Mutex::new(System::new())),
        }
    }

    /// Usage of the given pids; pids that no longer exist are omitted.
    /// CPU usage is relative to the previous call, so the first sample reads 0.
    pub async fn sample(&self, pids: Vec<u32>) -> anyhow::Result<HashMap<u32, ProcessUsage>> {
        if pids.is_empty() {
            return Ok(HashMap::new());
        }
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            let targets: Vec<Pid> = pids.iter().map(|p| Pid::from_u32(*p)).collect();
            sys.refresh_processes_specifics(
                ProcessesToUpdate::Some(&targets),
                true,
                ProcessRefreshKind::nothing().with_cpu().with_memory(),
            );
            let mut out = HashMap::with_capacity(pids.len());
            for pid in pids {
                if let Some(process) = sys.process(Pid::from_u32(pid)) {
                    out.insert(
                        pid,
                        ProcessUsage {
                            cpu: process.cpu_usage(),
                            memory: process.memory(),
                        },
                    );
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| anyhow::anyhow!("process stats task failed: {}", e))?
    }
}
