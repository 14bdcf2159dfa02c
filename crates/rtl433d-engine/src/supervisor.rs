//! Supervision of the external rtl_433 process.
//!
//! [`ProcessSupervisor`] is the single owner of the capture process: it runs
//! the device preflight, spawns rtl_433, and drives two background reader
//! tasks over its stdout and stderr. Decoded JSON objects and fatal failure
//! classifications flow to the coordinator over an mpsc channel; no other
//! component may spawn, signal, or read from the process.
//!
//! Teardown is uniform for every trigger (explicit stop, fatal stderr match,
//! reader end-of-stream): set the handle's shutdown flag, SIGTERM, a bounded
//! grace period, then a forced kill. Each process reports at most one fatal
//! event even though both readers observe its end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use rtl433d_core::error::{FailureKind, ProcessError};
use rtl433d_core::frame::LineFramer;

use crate::command::CaptureCommand;
use crate::preflight::Preflight;

/// Grace period between SIGTERM and a forced kill.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Read chunk size for the stdout reader.
const READ_CHUNK: usize = 1024;

/// stderr substrings that indicate an unrecoverable device condition.
const CRITICAL_STDERR: &[(&str, FailureKind)] = &[
    ("usb_claim_interface error", FailureKind::DeviceBusy),
    ("device not found", FailureKind::DeviceNotFound),
    ("device or resource busy", FailureKind::DeviceBusy),
];

/// Classify one stderr line against the critical condition table.
pub fn classify_stderr(line: &str) -> Option<FailureKind> {
    let lower = line.to_lowercase();
    CRITICAL_STDERR
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, kind)| *kind)
}

// =============================================================================
// Events & Handle
// =============================================================================

/// Event stream from the supervisor's reader tasks to the coordinator.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// One well-formed JSON object decoded from stdout.
    Record(serde_json::Value),
    /// The process hit an unrecoverable condition and must be restarted.
    Fatal(FailureKind),
}

/// Live capture process plus its two reader tasks.
///
/// At most one handle exists at a time; starting a new one tears down any
/// predecessor first.
struct ProcessHandle {
    child: Child,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
    /// Checked by both readers; set before teardown so end-of-stream after a
    /// deliberate kill is not misreported as an unexpected exit.
    shutdown: Arc<AtomicBool>,
}

// =============================================================================
// Supervisor
// =============================================================================

/// Owns the rtl_433 process lifecycle: preflight, start, readers, teardown.
pub struct ProcessSupervisor {
    command: CaptureCommand,
    preflight: Option<Preflight>,
    events: mpsc::Sender<SupervisorEvent>,
    handle: Option<ProcessHandle>,
}

impl ProcessSupervisor {
    /// Create a supervisor that reports on `events`.
    ///
    /// `preflight` is `None` only when driving fixtures in tests; real
    /// deployments always self-test the device first.
    pub fn new(
        command: CaptureCommand,
        preflight: Option<Preflight>,
        events: mpsc::Sender<SupervisorEvent>,
    ) -> Self {
        Self {
            command,
            preflight,
            events,
            handle: None,
        }
    }

    /// Whether a capture process is currently attached.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start the capture process.
    ///
    /// Any existing process is torn down first. Runs the device preflight,
    /// spawns rtl_433, and attaches the stdout/stderr reader tasks. A
    /// successful return means the preflight passed and the process is live,
    /// which is the coordinator's definition of a successful connection.
    pub async fn start(&mut self) -> Result<(), ProcessError> {
        self.stop().await;

        if let Some(preflight) = &self.preflight {
            preflight.run().await?;
        }

        let mut child = self.command.build().spawn().map_err(|source| {
            ProcessError::Spawn {
                program: self.command.program().to_string(),
                source,
            }
        })?;

        info!(
            program = self.command.program(),
            args = self.command.args().join(" ").as_str(),
            "started capture process"
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        // Both readers observe the same end of the process; the flag makes
        // sure only the first one reports it, so one real failure never
        // queues two restarts.
        let fatal_sent = Arc::new(AtomicBool::new(false));
        // Stdio handles are always piped by CaptureCommand::build.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = spawn_stdout_reader(
            stdout,
            self.events.clone(),
            shutdown.clone(),
            fatal_sent.clone(),
        );
        let stderr_task =
            spawn_stderr_reader(stderr, self.events.clone(), shutdown.clone(), fatal_sent);

        self.handle = Some(ProcessHandle {
            child,
            stdout_task,
            stderr_task,
            shutdown,
        });
        Ok(())
    }

    /// Tear down the capture process if one is attached. Idempotent.
    pub async fn stop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        handle.shutdown.store(true, Ordering::SeqCst);

        if let Some(pid) = handle.child.id() {
            terminate(pid);
        }
        match timeout(TERMINATE_GRACE, handle.child.wait()).await {
            Ok(Ok(status)) => {
                info!(%status, "capture process terminated");
            }
            Ok(Err(err)) => {
                warn!(error = %err, "error waiting for capture process");
            }
            Err(_) => {
                warn!("capture process did not terminate in time, killing it");
                if let Err(err) = handle.child.kill().await {
                    warn!(error = %err, "forced kill failed");
                }
            }
        }

        handle.stdout_task.abort();
        handle.stderr_task.abort();
    }
}

/// Send SIGTERM so rtl_433 can close the USB device cleanly.
#[cfg(unix)]
fn terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %err, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {
    // No graceful signal on this platform; the bounded wait in stop() falls
    // through to a forced kill.
}

// =============================================================================
// Reader Tasks
// =============================================================================

fn spawn_stdout_reader(
    stdout: Option<ChildStdout>,
    events: mpsc::Sender<SupervisorEvent>,
    shutdown: Arc<AtomicBool>,
    fatal_sent: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(mut stdout) = stdout else {
            return;
        };
        let mut framer = LineFramer::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            let n = match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    warn!(error = %err, "error reading capture stdout");
                    break;
                }
            };
            for line in framer.feed(&buf[..n]) {
                match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(value) => {
                        debug!(%value, "received capture record");
                        if events.send(SupervisorEvent::Record(value)).await.is_err() {
                            return;
                        }
                    }
                    Err(_) => {
                        debug!(line = line.as_str(), "dropping malformed JSON line");
                    }
                }
            }
        }

        if !shutdown.load(Ordering::SeqCst) && !fatal_sent.swap(true, Ordering::SeqCst) {
            warn!("capture stdout stream ended unexpectedly");
            let _ = events
                .send(SupervisorEvent::Fatal(FailureKind::UnexpectedExit))
                .await;
        }
    })
}

fn spawn_stderr_reader(
    stderr: Option<ChildStderr>,
    events: mpsc::Sender<SupervisorEvent>,
    shutdown: Arc<AtomicBool>,
    fatal_sent: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(stderr) = stderr else {
            return;
        };
        let mut lines = BufReader::new(stderr).lines();

        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    debug!(line, "capture stderr");
                    if let Some(kind) = classify_stderr(line) {
                        if fatal_sent.swap(true, Ordering::SeqCst) {
                            return;
                        }
                        error!(line, %kind, "critical capture process error");
                        let _ = events.send(SupervisorEvent::Fatal(kind)).await;
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "error reading capture stderr");
                    break;
                }
            }
        }

        if !shutdown.load(Ordering::SeqCst) && !fatal_sent.swap(true, Ordering::SeqCst) {
            warn!("capture stderr stream ended unexpectedly");
            let _ = events
                .send(SupervisorEvent::Fatal(FailureKind::UnexpectedExit))
                .await;
        }
    })
}
