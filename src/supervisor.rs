use crate::errors::{Result, StreamError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::timeout;

const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Command line for one external transcoder run.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Tag carried into every forwarded diagnostic line.
    pub label: String,
}

/// Terminal outcome of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Clean,
    Failed(Option<i32>),
    Killed,
}

impl ProcessExit {
    pub fn is_clean(&self) -> bool {
        matches!(self, ProcessExit::Clean)
    }
}

fn exit_of(status: std::process::ExitStatus) -> ProcessExit {
    if status.success() {
        ProcessExit::Clean
    } else {
        ProcessExit::Failed(status.code())
    }
}

/// Both halves of a freshly launched process. The control half stays with the
/// session that owns the process; the exit half is consumed by its monitor
/// task. Exactly one `ProcessExit` is ever reported per launch.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    terminate: oneshot::Sender<()>,
    exit: ExitWatch,
}

pub type ExitWatch = oneshot::Receiver<ProcessExit>;

impl ProcessHandle {
    pub fn new(pid: Option<u32>, terminate: oneshot::Sender<()>, exit: ExitWatch) -> Self {
        Self {
            pid,
            terminate,
            exit,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn into_parts(self) -> (ProcessControl, ExitWatch) {
        (
            ProcessControl {
                pid: self.pid,
                terminate: self.terminate,
            },
            self.exit,
        )
    }
}

/// The session-owned half: enough to ask the process to go away.
#[derive(Debug)]
pub struct ProcessControl {
    pid: Option<u32>,
    terminate: oneshot::Sender<()>,
}

impl ProcessControl {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Requests termination. The owning task force-kills after a bounded grace
    /// period, so this never blocks the caller.
    pub fn terminate(self) {
        let _ = self.terminate.send(());
    }
}

#[async_trait]
pub trait Supervisor: Send + Sync {
    async fn launch(&self, spec: LaunchSpec) -> Result<ProcessHandle>;
}

/// Runs real OS processes, piping their output into the log.
pub struct CommandSupervisor {
    grace_period: Duration,
}

impl CommandSupervisor {
    pub fn new() -> Self {
        Self {
            grace_period: KILL_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(grace_period: Duration) -> Self {
        Self { grace_period }
    }
}

impl Default for CommandSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Supervisor for CommandSupervisor {
    async fn launch(&self, spec: LaunchSpec) -> Result<ProcessHandle> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| StreamError::SpawnFailed { source })?;

        let pid = child.id();
        log::info!(
            "Launched '{}' for {} (pid {})",
            spec.program,
            spec.label,
            pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
        );

        if let Some(stdout) = child.stdout.take() {
            pump_lines(stdout, format!("{}:stdout", spec.label));
        }
        if let Some(stderr) = child.stderr.take() {
            pump_lines(stderr, format!("{}:stderr", spec.label));
        }

        let (terminate_tx, terminate_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let grace_period = self.grace_period;
        let label = spec.label.clone();
        tokio::spawn(async move {
            let exit = supervise(child, terminate_rx, grace_period, &label).await;
            let _ = exit_tx.send(exit);
        });

        Ok(ProcessHandle::new(pid, terminate_tx, exit_rx))
    }
}

/// Owns the child for its whole life. `wait()` only ever runs here, never on a
/// request-handling task.
async fn supervise(
    mut child: Child,
    terminate: oneshot::Receiver<()>,
    grace_period: Duration,
    label: &str,
) -> ProcessExit {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => exit_of(status),
            Err(err) => {
                log::error!("Failed to reap {}: {}", label, err);
                ProcessExit::Failed(None)
            }
        },
        // Also taken when the control half is dropped: a process must not
        // outlive the session that owns it.
        _ = terminate => {
            if let Err(err) = child.start_kill() {
                log::warn!("Kill request for {} failed: {}", label, err);
            }
            match timeout(grace_period, child.wait()).await {
                Ok(_) => ProcessExit::Killed,
                Err(_) => {
                    log::warn!(
                        "{} still running {:?} after kill request, forcing",
                        label,
                        grace_period
                    );
                    let _ = child.kill().await;
                    ProcessExit::Killed
                }
            }
        }
    }
}

fn pump_lines<R>(pipe: R, tag: String)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        log::info!("[{}] {}", tag, line);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    log::error!("[{}] Error reading output: {}", tag, err);
                    break;
                }
            }
        }
    });
}
