// One OS process: stdout/stderr capture, stdin writer, exit wait.

use super::log_sink::LogSink;
use crate::error::{PanelError, Result};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant};

const STDIN_QUEUE: usize = 64;
/// How long console readers may keep running after the process has exited.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// Handle kept in the supervisor map while the process is alive.
#[derive(Clone)]
pub(super) struct ProcessHandle {
    pub generation: u64,
    pub pid: Option<u32>,
    pub started_at: Instant,
    stdin: mpsc::Sender<String>,
    kill: mpsc::Sender<()>,
    exited: watch::Receiver<bool>,
    stop_requested: Arc<AtomicBool>,
}

impl ProcessHandle {
    pub async fn send_line(&self, line: String) -> bool {
        self.stdin.send(line).await.is_ok()
    }

    /// Marks the coming exit as requested (Offline rather than Crashed).
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn kill(&self) {
        self.request_stop();
        // A full queue means a kill is already pending.
        let _ = self.kill.try_send(());
    }

    /// Resolves once the exit has been fully recorded.
    pub async fn wait_exited(&self) {
        let mut rx = self.exited.clone();
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// Parts the worker task owns.
pub(super) struct ProcessWorker {
    pub child: Child,
    pub kill_rx: mpsc::Receiver<()>,
    pub exited_tx: watch::Sender<bool>,
    pub stop_requested: Arc<AtomicBool>,
    pid: Option<u32>,
    readers: Vec<tokio::task::JoinHandle<()>>,
}

/// Outcome of one run.
pub(super) struct ExitInfo {
    pub code: Option<i32>,
    pub requested: bool,
}

impl ExitInfo {
    pub fn crashed(&self) -> bool {
        !self.requested && self.code != Some(0)
    }
}

pub(super) fn spawn(
    program: &str,
    args: &[String],
    cwd: &Path,
    sink: Arc<LogSink>,
    generation: u64,
) -> Result<(ProcessHandle, ProcessWorker)> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a kill also reaches wrapper scripts' children.
    #[cfg(unix)]
    command.process_group(0);
    let mut child = command
        .spawn()
        .map_err(|e| PanelError::Internal(anyhow::anyhow!("failed to launch {}: {}", program, e)))?;

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump_lines(stdout, sink.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump_lines(stderr, sink.clone())));
    }

    let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(STDIN_QUEUE);
    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            while let Some(line) = stdin_rx.recv().await {
                let mut bytes = line.into_bytes();
                bytes.push(b'\n');
                if let Err(e) = stdin.write_all(&bytes).await {
                    tracing::debug!(error = %e, "stdin closed");
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });
    }

    let (kill_tx, kill_rx) = mpsc::channel(1);
    let (exited_tx, exited_rx) = watch::channel(false);
    let stop_requested = Arc::new(AtomicBool::new(false));

    let handle = ProcessHandle {
        generation,
        pid: child.id(),
        started_at: Instant::now(),
        stdin: stdin_tx,
        kill: kill_tx,
        exited: exited_rx,
        stop_requested: stop_requested.clone(),
    };
    let worker = ProcessWorker {
        pid: child.id(),
        child,
        kill_rx,
        exited_tx,
        stop_requested,
        readers,
    };
    Ok((handle, worker))
}

impl ProcessWorker {
    /// Waits for the process to exit (killing it on request) and for its output to drain.
    pub async fn wait(&mut self) -> ExitInfo {
        let status: std::io::Result<ExitStatus> = tokio::select! {
            status = self.child.wait() => status,
            Some(()) = self.kill_rx.recv() => {
                self.kill_group();
                if let Err(e) = self.child.start_kill() {
                    tracing::warn!(error = %e, "kill failed");
                }
                self.child.wait().await
            }
        };
        // Leftover children may still hold the pipes open.
        let drained = tokio::time::timeout(
            OUTPUT_DRAIN,
            futures_util::future::join_all(self.readers.iter_mut()),
        )
        .await
        .is_ok();
        if !drained {
            tracing::debug!(pid = ?self.pid, "console output still open after exit, detaching readers");
            for reader in &self.readers {
                reader.abort();
            }
        }
        self.readers.clear();
        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!(error = %e, "waiting for process failed");
                None
            }
        };
        ExitInfo {
            code,
            requested: self.stop_requested.load(Ordering::SeqCst),
        }
    }

    /// SIGKILL to the whole process group. Must run before the child is reaped.
    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pid) = self.pid.and_then(|p| i32::try_from(p).ok()) else {
            return;
        };
        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            tracing::debug!(pid, error = %e, "process group kill failed");
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

async fn pump_lines<R: AsyncRead + Unpin>(reader: R, sink: Arc<LogSink>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => sink.push(line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "console read failed");
                break;
            }
        }
    }
}
