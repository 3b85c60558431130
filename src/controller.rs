use std::path::Path;
use std::sync::Mutex;

use crate::notify::Notifier;
use crate::privilege::{PrivilegedCommand, ProcessRunner, RunStatus};
use crate::state::{DeviceState, IconToken, StateReader};

pub const NOTIFY_TITLE: &str = "Touchpad";
pub const STARTUP_TITLE: &str = "Touchpad Toggle";

/// Result of one toggle attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Succeeded(DeviceState),
    /// Any non-zero helper exit; almost always a dismissed password prompt.
    UserCancelled,
    TimedOut,
    Failed(String),
}

impl ToggleOutcome {
    pub fn message(&self) -> String {
        match self {
            ToggleOutcome::Succeeded(state) => state.label().to_string(),
            ToggleOutcome::UserCancelled => "Toggle cancelled (no password)".to_string(),
            ToggleOutcome::TimedOut => "Toggle timed out".to_string(),
            ToggleOutcome::Failed(reason) => format!("Toggle failed: {}", reason),
        }
    }

    /// Short machine-readable name, used in IPC responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ToggleOutcome::Succeeded(_) => "succeeded",
            ToggleOutcome::UserCancelled => "cancelled",
            ToggleOutcome::TimedOut => "timed-out",
            ToggleOutcome::Failed(_) => "failed",
        }
    }
}

/// Status pushed to presentation consumers after every refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub enabled: bool,
    pub status: String,
    pub icon: IconToken,
}

impl StatusView {
    pub fn from_state(state: DeviceState) -> Self {
        Self {
            enabled: state.is_enabled(),
            status: state.status_text().to_string(),
            icon: state.icon(),
        }
    }

    /// Placeholder shown before the first refresh lands.
    pub fn checking() -> Self {
        Self {
            enabled: true,
            status: "Checking...".to_string(),
            icon: IconToken::TouchpadOn,
        }
    }
}

pub trait StatusSink: Send + Sync {
    fn publish(&self, view: &StatusView);
}

/// Sink for running without a tray.
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn publish(&self, view: &StatusView) {
        log::debug!("Touchpad {}", view.status);
    }
}

pub struct ToggleController {
    reader: StateReader,
    command: PrivilegedCommand,
    runner: Box<dyn ProcessRunner>,
    notifier: Box<dyn Notifier>,
    sink: Box<dyn StatusSink>,
    // Held for the whole read-write-refresh sequence: one helper process at a time
    write_lock: Mutex<()>,
}

impl ToggleController {
    pub fn new(
        command: PrivilegedCommand,
        runner: Box<dyn ProcessRunner>,
        notifier: Box<dyn Notifier>,
        sink: Box<dyn StatusSink>,
    ) -> Self {
        Self {
            reader: StateReader::new(command.path.clone()),
            command,
            runner,
            notifier,
            sink,
            write_lock: Mutex::new(()),
        }
    }

    pub fn inhibit_path(&self) -> &Path {
        self.reader.path()
    }

    /// Startup check: warns once if the inhibit attribute is missing.
    /// The applet keeps running; reads then fail open to `Enabled`.
    pub fn verify_device(&self) -> bool {
        if self.reader.path().exists() {
            return true;
        }
        log::warn!("{} not found!", self.reader.path().display());
        self.notifier.notify(STARTUP_TITLE, "Error: Could not find touchpad device");
        false
    }

    pub fn status(&self) -> StatusView {
        StatusView::from_state(self.reader.read())
    }

    /// Re-read the device and push the result to the sink.
    pub fn refresh(&self) -> DeviceState {
        let state = self.reader.read();
        self.sink.publish(&StatusView::from_state(state));
        state
    }

    /// Flip the touchpad through the privilege helper.
    ///
    /// Concurrent callers are serialized; a second request waits for the first
    /// to resolve and then toggles from the state it left behind. Every call
    /// emits exactly one notification and one refresh.
    pub fn toggle(&self) -> ToggleOutcome {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.reader.read();
        let target = current.toggled();
        let outcome = self.write(target);

        log::info!("Toggle {} -> {}: {:?}", current.label(), target.label(), outcome);
        self.notifier.notify(NOTIFY_TITLE, &outcome.message());
        self.refresh();
        outcome
    }

    fn write(&self, target: DeviceState) -> ToggleOutcome {
        let args = self.command.args_for(target);
        match self.runner.run(&self.command.helper, &args, self.command.timeout) {
            Ok(RunStatus::Exited(report)) if report.success => ToggleOutcome::Succeeded(target),
            Ok(RunStatus::Exited(report)) => {
                log::warn!(
                    "{} exited with {:?}: {}",
                    self.command.helper,
                    report.code,
                    report.stderr.trim()
                );
                log::debug!("{} stdout: {}", self.command.helper, report.stdout.trim());
                ToggleOutcome::UserCancelled
            }
            Ok(RunStatus::TimedOut) => ToggleOutcome::TimedOut,
            Err(e) => ToggleOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::{ExitReport, RunError};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone)]
    enum Script {
        Exit(i32),
        Timeout,
        SpawnFails,
    }

    /// Pretends to be the helper. On success it performs the write itself.
    struct StubRunner {
        script: Script,
        path: PathBuf,
        delay: Duration,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl ProcessRunner for StubRunner {
        fn run(&self, program: &str, args: &[String], _timeout: Duration) -> Result<RunStatus, RunError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(args.to_vec());
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            match self.script {
                Script::Exit(0) => {
                    let digit = args[2].split_whitespace().nth(1).unwrap();
                    fs::write(&self.path, format!("{}\n", digit)).unwrap();
                    Ok(RunStatus::Exited(ExitReport { success: true, code: Some(0), ..Default::default() }))
                }
                Script::Exit(code) => Ok(RunStatus::Exited(ExitReport {
                    success: false,
                    code: Some(code),
                    stderr: "Error executing command as another user: Not authorized".into(),
                    ..Default::default()
                })),
                Script::Timeout => Ok(RunStatus::TimedOut),
                Script::SpawnFails => Err(RunError::Spawn {
                    program: program.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
                }),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier(Arc<Mutex<Vec<(String, String)>>>);

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, body: &str) {
            self.0.lock().unwrap().push((title.into(), body.into()));
        }
    }

    #[derive(Clone, Default)]
    struct CountingSink(Arc<Mutex<Vec<StatusView>>>);

    impl StatusSink for CountingSink {
        fn publish(&self, view: &StatusView) {
            self.0.lock().unwrap().push(view.clone());
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        path: PathBuf,
        controller: ToggleController,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        max_active: Arc<AtomicUsize>,
        notes: RecordingNotifier,
        views: CountingSink,
    }

    fn harness(initial: Option<&str>, script: Script, delay: Duration) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inhibited");
        if let Some(content) = initial {
            fs::write(&path, content).unwrap();
        }
        let calls = Arc::new(Mutex::new(Vec::new()));
        let max_active = Arc::new(AtomicUsize::new(0));
        let runner = StubRunner {
            script,
            path: path.clone(),
            delay,
            calls: calls.clone(),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: max_active.clone(),
        };
        let notes = RecordingNotifier::default();
        let views = CountingSink::default();
        let command = PrivilegedCommand::new("pkexec", "bash", &path, Duration::from_secs(30));
        let controller = ToggleController::new(
            command,
            Box::new(runner),
            Box::new(notes.clone()),
            Box::new(views.clone()),
        );
        Harness { _dir: dir, path, controller, calls, max_active, notes, views }
    }

    fn written_digit(args: &[String]) -> &str {
        args[2].split_whitespace().nth(1).unwrap()
    }

    #[test]
    fn enabled_device_is_disabled_end_to_end() {
        let h = harness(Some("0\n"), Script::Exit(0), Duration::ZERO);
        assert_eq!(h.controller.refresh(), DeviceState::Enabled);
        h.views.0.lock().unwrap().clear();

        let outcome = h.controller.toggle();

        assert_eq!(outcome, ToggleOutcome::Succeeded(DeviceState::Disabled));
        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(written_digit(&calls[0]), "1");
        assert_eq!(calls[0][0], "bash");

        let notes = h.notes.0.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].1.contains("Disabled"));

        let views = h.views.0.lock().unwrap();
        assert_eq!(views.len(), 1);
        assert!(!views[0].enabled);
        assert_eq!(views[0].status, "Disabled ✗");
        assert_eq!(views[0].icon, IconToken::TouchpadOff);
        assert_eq!(fs::read_to_string(&h.path).unwrap().trim(), "1");
    }

    #[test]
    fn disabled_device_writes_zero() {
        let h = harness(Some("1"), Script::Exit(0), Duration::ZERO);
        assert_eq!(h.controller.toggle(), ToggleOutcome::Succeeded(DeviceState::Enabled));
        assert_eq!(written_digit(&h.calls.lock().unwrap()[0]), "0");
        assert_eq!(h.notes.0.lock().unwrap()[0], (NOTIFY_TITLE.to_string(), "Enabled".to_string()));
    }

    #[test]
    fn unreadable_device_is_treated_as_enabled() {
        let h = harness(None, Script::Exit(126), Duration::ZERO);
        assert_eq!(h.controller.refresh(), DeviceState::Enabled);
        h.controller.toggle();
        assert_eq!(written_digit(&h.calls.lock().unwrap()[0]), "1");
    }

    #[test]
    fn nonzero_exit_is_cancellation() {
        let h = harness(Some("0"), Script::Exit(126), Duration::ZERO);
        assert_eq!(h.controller.toggle(), ToggleOutcome::UserCancelled);
        assert_eq!(h.notes.0.lock().unwrap()[0].1, "Toggle cancelled (no password)");
        assert_eq!(h.views.0.lock().unwrap().len(), 1);
        assert_eq!(fs::read_to_string(&h.path).unwrap(), "0");
    }

    #[test]
    fn timeout_is_reported() {
        let h = harness(Some("0"), Script::Timeout, Duration::ZERO);
        assert_eq!(h.controller.toggle(), ToggleOutcome::TimedOut);
        assert_eq!(h.notes.0.lock().unwrap()[0].1, "Toggle timed out");
        assert_eq!(h.views.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn launch_failure_carries_diagnostic() {
        let h = harness(Some("0"), Script::SpawnFails, Duration::ZERO);
        let outcome = h.controller.toggle();
        match &outcome {
            ToggleOutcome::Failed(reason) => {
                assert!(!reason.is_empty());
                assert!(reason.contains("pkexec"));
            }
            other => panic!("unexpected {:?}", other),
        }
        let notes = h.notes.0.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].1.starts_with("Toggle failed: "));
        assert_eq!(h.views.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_toggles_are_serialized() {
        let h = harness(Some("0"), Script::Exit(0), Duration::from_millis(150));
        let controller = Arc::new(h.controller);

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let c = controller.clone();
                std::thread::spawn(move || c.toggle())
            })
            .collect();
        let outcomes: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        assert_eq!(h.max_active.load(Ordering::SeqCst), 1);
        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        // The second toggle starts from the state the first one left behind
        assert_eq!(written_digit(&calls[0]), "1");
        assert_eq!(written_digit(&calls[1]), "0");
        assert!(outcomes.contains(&ToggleOutcome::Succeeded(DeviceState::Disabled)));
        assert!(outcomes.contains(&ToggleOutcome::Succeeded(DeviceState::Enabled)));
    }

    #[test]
    fn refresh_is_not_blocked_by_pending_toggle() {
        let delay = Duration::from_millis(800);
        let h = harness(Some("0"), Script::Exit(0), delay);
        let controller = Arc::new(h.controller);

        let worker = {
            let c = controller.clone();
            std::thread::spawn(move || c.toggle())
        };
        // Let the toggle take the lock and enter the helper
        while h.calls.lock().unwrap().is_empty() {
            std::thread::sleep(Duration::from_millis(5));
        }

        let started = std::time::Instant::now();
        assert_eq!(controller.refresh(), DeviceState::Enabled);
        assert!(started.elapsed() < delay / 4, "refresh took {:?}", started.elapsed());
        assert_eq!(h.views.0.lock().unwrap().len(), 1);

        assert_eq!(worker.join().unwrap(), ToggleOutcome::Succeeded(DeviceState::Disabled));
        assert_eq!(h.views.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn missing_device_notifies_once_at_startup() {
        let h = harness(None, Script::Exit(0), Duration::ZERO);
        assert!(!h.controller.verify_device());
        let notes = h.notes.0.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, STARTUP_TITLE);

        let present = harness(Some("0"), Script::Exit(0), Duration::ZERO);
        assert!(present.controller.verify_device());
        assert!(present.notes.0.lock().unwrap().is_empty());
    }
}
