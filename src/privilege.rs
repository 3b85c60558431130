use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use crate::state::DeviceState;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const TERM_GRACE: Duration = Duration::from_millis(500);
// Floor for collecting output when the helper exits right at the deadline
const OUTPUT_GRACE: Duration = Duration::from_millis(200);

/// What a finished helper process left behind.
#[derive(Debug, Clone, Default)]
pub struct ExitReport {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub enum RunStatus {
    Exited(ExitReport),
    /// The deadline passed; the process has been signalled and, where permitted, reaped.
    TimedOut,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for helper process: {0}")]
    Wait(#[source] std::io::Error),
}

pub trait ProcessRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<RunStatus, RunError>;
}

/// The shell command that writes a new state into the inhibit attribute.
#[derive(Debug, Clone)]
pub struct PrivilegedCommand {
    pub helper: String,
    pub shell: String,
    pub path: PathBuf,
    pub timeout: Duration,
}

impl PrivilegedCommand {
    pub fn new(helper: impl Into<String>, shell: impl Into<String>, path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            helper: helper.into(),
            shell: shell.into(),
            path: path.into(),
            timeout,
        }
    }

    /// Arguments passed to the helper: `<shell> -c "echo <digit> > <path>"`.
    pub fn args_for(&self, target: DeviceState) -> Vec<String> {
        vec![
            self.shell.clone(),
            "-c".into(),
            format!("echo {} > {}", target.inhibit_value(), shell_quote(&self.path)),
        ]
    }
}

fn shell_quote(path: &Path) -> String {
    let s = path.to_string_lossy();
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Runs helpers as child processes with captured output and a hard deadline.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<RunStatus, RunError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunError::Spawn { program: program.to_string(), source })?;

        // Drain both pipes so a chatty helper can't block on a full buffer
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if Instant::now() >= deadline => break None,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    if child.kill().is_ok() {
                        let _ = child.wait();
                    }
                    return Err(RunError::Wait(e));
                }
            }
        };

        let Some(status) = status else {
            log::warn!("{} did not finish within {:?}, terminating pid {}", program, timeout, child.id());
            terminate(&mut child);
            // Readers are left to finish on their own; grandchildren may hold the pipes open
            return Ok(RunStatus::TimedOut);
        };

        let output_deadline = deadline.max(Instant::now() + OUTPUT_GRACE);
        Ok(RunStatus::Exited(ExitReport {
            success: status.success(),
            code: status.code(),
            stdout: collect_output(stdout, output_deadline),
            stderr: collect_output(stderr, output_deadline),
        }))
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    let mut pipe = pipe?;
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("helper-output".into())
        .spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        })
        .ok()?;
    Some(rx)
}

/// Output read so far is dropped if the pipe stays open past `deadline`,
/// e.g. when the helper left a background process holding it.
fn collect_output(rx: Option<Receiver<String>>, deadline: Instant) -> String {
    let Some(rx) = rx else { return String::new() };
    let remaining = deadline.saturating_duration_since(Instant::now());
    rx.recv_timeout(remaining).unwrap_or_else(|_| {
        log::debug!("Helper output still open at deadline, discarding");
        String::new()
    })
}

/// SIGTERM first so the helper can tear down its agent dialog, then SIGKILL.
fn terminate(child: &mut Child) {
    let pid = Pid::from_raw(child.id() as i32);
    if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
        log::debug!("SIGTERM to {} failed: {}", pid, e);
    }

    let grace_end = Instant::now() + TERM_GRACE;
    while Instant::now() < grace_end {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }

    match child.kill() {
        Ok(()) => {
            let _ = child.wait();
        }
        // Typically EPERM once the helper runs as root; waiting could block forever
        Err(e) => log::warn!("Failed to kill helper {}: {}", pid, e),
    }
}
