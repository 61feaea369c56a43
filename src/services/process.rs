//! Child-process execution shared by the compiler, archiver and tool probes.
//!
//! Both standard streams are piped and merged into a single line-ordered stream of
//! [`OutputLine`]s. Lines from the same stream always keep their order; lines from
//! different streams are ordered by arrival.

use crate::models::{OutputLine, StreamSource};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// How long to keep reading buffered output after the process has exited
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited on its own; `None` when it was terminated by a signal
    Exited(Option<i32>),
    Cancelled,
    TimedOut,
}

impl ProcessExit {
    pub fn success(self) -> bool {
        self == ProcessExit::Exited(Some(0))
    }

    pub fn code(self) -> Option<i32> {
        match self {
            ProcessExit::Exited(code) => code,
            _ => None,
        }
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        ProcessExit::Exited(status.code())
    }
}

/// Everything a finished child produced
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit: ProcessExit,
    pub lines: Vec<OutputLine>,
    pub duration: Duration,
}

/// Time limits applied to a child process
#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    /// Wall-clock limit before the process is terminated
    pub timeout: Duration,
    /// Time a terminated process gets to exit before it is killed
    pub grace: Duration,
}

/// Run `command` to completion, streaming each output line to `on_line` as it arrives.
///
/// Cancellation is signalled by `true` on `cancel_rx`. A cancelled or timed-out child is asked
/// to terminate and killed if it is still alive after `limits.grace`.
///
/// # Errors
///
/// Returns the spawn error when the process cannot be started; the caller decides which
/// tool-level error that maps to.
pub async fn run_streaming<F>(
    mut command: Command,
    mut on_line: F,
    cancel_rx: &mut watch::Receiver<bool>,
    limits: ProcessLimits,
) -> std::io::Result<ProcessOutput>
where
    F: FnMut(&OutputLine),
{
    let start = Instant::now();

    if *cancel_rx.borrow() {
        return Ok(ProcessOutput {
            exit: ProcessExit::Cancelled,
            lines: Vec::new(),
            duration: start.elapsed(),
        });
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;

    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let readers: Vec<JoinHandle<()>> = [
        spawn_reader(child.stdout.take(), StreamSource::Stdout, line_tx.clone()),
        spawn_reader(child.stderr.take(), StreamSource::Stderr, line_tx.clone()),
    ]
    .into_iter()
    .flatten()
    .collect();
    drop(line_tx);

    let deadline = tokio::time::sleep(limits.timeout);
    tokio::pin!(deadline);

    let mut lines = Vec::new();
    let mut streams_open = true;
    let mut cancel_open = true;

    let exit = loop {
        tokio::select! {
            biased;

            line = line_rx.recv(), if streams_open => match line {
                Some(line) => {
                    on_line(&line);
                    lines.push(line);
                }
                None => streams_open = false,
            },

            changed = cancel_rx.changed(), if cancel_open => {
                let cancelled = changed.is_ok() && *cancel_rx.borrow();
                if changed.is_err() {
                    // Sender gone: nobody can cancel any more
                    cancel_open = false;
                } else if cancelled {
                    tracing::warn!("Cancellation requested, terminating child process");
                    terminate(&mut child, limits.grace).await;
                    break ProcessExit::Cancelled;
                }
            }

            status = child.wait() => {
                break ProcessExit::from(status?);
            }

            _ = &mut deadline => {
                tracing::warn!("Child process timed out after {:?}", limits.timeout);
                terminate(&mut child, limits.grace).await;
                break ProcessExit::TimedOut;
            }
        }
    };

    // Pick up whatever the pipes still hold; a grandchild that inherited them must not stall us
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(line) = line_rx.recv().await {
            on_line(&line);
            lines.push(line);
        }
    })
    .await;
    if drained.is_err() {
        tracing::debug!("Output pipes still open after exit, abandoning remaining output");
    }

    for reader in readers {
        reader.abort();
    }

    Ok(ProcessOutput {
        exit,
        lines,
        duration: start.elapsed(),
    })
}

/// Render a command line for log output
pub fn describe_command(command: &Command) -> String {
    let std_command = command.as_std();
    let mut rendered = std_command.get_program().to_string_lossy().into_owned();
    for arg in std_command.get_args() {
        let arg = arg.to_string_lossy();
        if arg.contains(' ') {
            rendered.push_str(&format!(" \"{}\"", arg));
        } else {
            rendered.push(' ');
            rendered.push_str(&arg);
        }
    }
    rendered
}

fn spawn_reader<R>(
    reader: Option<R>,
    source: StreamSource,
    tx: mpsc::UnboundedSender<OutputLine>,
) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let reader = reader?;
    Some(tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    // Tools may print in the platform code page; keep the line even if it is not UTF-8
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send(OutputLine { source, text }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read {:?} of child process: {}", source, e);
                    break;
                }
            }
        }
    }))
}

/// Ask the child to exit, then kill it if it is still running after `grace`.
async fn terminate(child: &mut Child, grace: Duration) {
    request_exit(child).await;

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => tracing::debug!("Child process exited within grace period"),
        Err(_) => {
            tracing::warn!("Child process still running after {:?}, killing", grace);
            if let Err(e) = child.kill().await {
                tracing::error!("Failed to kill child process: {}", e);
            }
        }
    }
}

#[cfg(unix)]
async fn request_exit(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let result = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        tracing::debug!("Could not send SIGTERM to {}: {}", pid, e);
    }
}

#[cfg(windows)]
async fn request_exit(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        tracing::debug!("Could not ask process {} to exit: {}", pid, e);
    }
}

#[cfg(not(any(unix, windows)))]
async fn request_exit(_child: &Child) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn limits() -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(10),
            grace: Duration::from_millis(200),
        }
    }

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        command
    }

    #[tokio::test]
    async fn test_captures_both_streams_in_order() {
        let (_cancel_tx, mut cancel_rx) = watch::channel(false);
        let mut seen = Vec::new();

        let output = run_streaming(
            sh("echo one; echo two >&2; echo three"),
            |line| seen.push(line.text.clone()),
            &mut cancel_rx,
            limits(),
        )
        .await
        .unwrap();

        assert!(output.exit.success());
        assert_eq!(output.lines.len(), 3);
        assert_eq!(seen.len(), 3);

        let stdout: Vec<_> = output
            .lines
            .iter()
            .filter(|l| l.source == StreamSource::Stdout)
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(stdout, vec!["one", "three"]);
        assert!(output
            .lines
            .iter()
            .any(|l| l.source == StreamSource::Stderr && l.text == "two"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_code() {
        let (_cancel_tx, mut cancel_rx) = watch::channel(false);
        let output = run_streaming(sh("exit 3"), |_| {}, &mut cancel_rx, limits())
            .await
            .unwrap();
        assert_eq!(output.exit, ProcessExit::Exited(Some(3)));
        assert!(!output.exit.success());
    }

    #[tokio::test]
    async fn test_cancellation_terminates_child() {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = cancel_tx.send(true);
        });

        let start = Instant::now();
        let output = run_streaming(sh("exec sleep 30"), |_| {}, &mut cancel_rx, limits())
            .await
            .unwrap();

        assert_eq!(output.exit, ProcessExit::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let (_cancel_tx, mut cancel_rx) = watch::channel(false);
        let output = run_streaming(
            sh("exec sleep 30"),
            |_| {},
            &mut cancel_rx,
            ProcessLimits {
                timeout: Duration::from_millis(100),
                grace: Duration::from_millis(100),
            },
        )
        .await
        .unwrap();
        assert_eq!(output.exit, ProcessExit::TimedOut);
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_spawn() {
        let (_cancel_tx, mut cancel_rx) = watch::channel(true);
        let output = run_streaming(
            Command::new("/definitely/not/a/real/binary"),
            |_| {},
            &mut cancel_rx,
            limits(),
        )
        .await
        .unwrap();
        assert_eq!(output.exit, ProcessExit::Cancelled);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let (_cancel_tx, mut cancel_rx) = watch::channel(false);
        let result = run_streaming(
            Command::new("/definitely/not/a/real/binary"),
            |_| {},
            &mut cancel_rx,
            limits(),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_describe_command_quotes_spaces() {
        let mut command = Command::new("javac");
        command.args(["-d", "/tmp/my classes", "A.java"]);
        assert_eq!(describe_command(&command), "javac -d \"/tmp/my classes\" A.java");
    }
}
