use anyhow::{anyhow, Context, Result};
use calloop::channel::{self, Event};
use calloop::generic::Generic;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, Interest, LoopSignal, Mode, PostAction};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TrayConfig;
use crate::controller::{LogSink, StatusSink, StatusView, ToggleController};
use crate::ipc::{self, IpcCommand, IpcResponse};
use crate::notify::{DesktopNotifier, LogNotifier, Notifier};
use crate::privilege::{PrivilegedCommand, SystemRunner};
use crate::tray::{self, TrayEvent};

const IPC_READ_TIMEOUT: Duration = Duration::from_secs(2);

struct Applet {
    controller: Arc<ToggleController>,
    signal: LoopSignal,
}

pub struct DaemonOptions {
    pub inhibit_path: PathBuf,
    pub socket: PathBuf,
    pub tray: bool,
}

pub fn run(config: TrayConfig, opts: DaemonOptions) -> Result<()> {
    let mut event_loop: EventLoop<Applet> =
        EventLoop::try_new().context("Failed to create event loop")?;
    let handle = event_loop.handle();

    // Bail before touching the session bus if another instance owns the socket
    let listener = ipc::create_listener(&opts.socket)?;

    let (events_tx, events_rx) = channel::channel::<TrayEvent>();

    let sink: Box<dyn StatusSink> = if opts.tray {
        Box::new(tray::spawn(config.tray.clone(), events_tx))
    } else {
        Box::new(LogSink)
    };
    let notifier: Box<dyn Notifier> = if config.notifications.enabled {
        Box::new(DesktopNotifier::new(config.tray.icon_enabled.clone()))
    } else {
        Box::new(LogNotifier)
    };

    let command = PrivilegedCommand::new(
        config.privilege.helper.clone(),
        config.privilege.shell.clone(),
        opts.inhibit_path.clone(),
        config.privilege.timeout(),
    );
    let controller = Arc::new(ToggleController::new(command, Box::new(SystemRunner), notifier, sink));
    controller.verify_device();
    let initial = controller.refresh();
    log::info!("Touchpad {} ({})", initial.label(), opts.inhibit_path.display());

    // Periodic refresh
    let interval = config.refresh.interval();
    handle
        .insert_source(Timer::from_duration(interval), move |_, _, applet: &mut Applet| {
            applet.controller.refresh();
            TimeoutAction::ToDuration(interval)
        })
        .map_err(|e| anyhow!("Failed to register refresh timer: {}", e.error))?;

    handle
        .insert_source(events_rx, |event, _, applet: &mut Applet| match event {
            Event::Msg(TrayEvent::Toggle) => applet.spawn_toggle(None),
            Event::Msg(TrayEvent::Quit) => {
                log::info!("Quit requested from tray");
                applet.signal.stop();
            }
            Event::Closed => {}
        })
        .map_err(|e| anyhow!("Failed to register tray events: {}", e.error))?;

    handle
        .insert_source(
            Generic::new(listener, Interest::READ, Mode::Level),
            |_, listener, applet: &mut Applet| {
                let listener: &UnixListener = listener.as_ref();
                applet.accept_ipc(listener);
                Ok(PostAction::Continue)
            },
        )
        .map_err(|e| anyhow!("Failed to register IPC socket: {}", e.error))?;

    let signal = event_loop.get_signal();
    {
        let signal = signal.clone();
        ctrlc::set_handler(move || {
            signal.stop();
            signal.wakeup();
        })
        .context("Failed to set signal handler")?;
    }

    let mut applet = Applet { controller, signal };
    let result = event_loop.run(None::<Duration>, &mut applet, |_| {});

    ipc::cleanup_socket(&opts.socket);
    result.context("Event loop failed")?;
    log::info!("Shutting down");
    Ok(())
}

impl Applet {
    /// Run a toggle off the loop thread so refreshes continue while the
    /// password prompt is up. The controller serializes overlapping requests.
    fn spawn_toggle(&self, reply: Option<UnixStream>) {
        let controller = self.controller.clone();
        let spawned = std::thread::Builder::new()
            .name("toggle".into())
            .spawn(move || {
                let outcome = controller.toggle();
                if let Some(mut stream) = reply {
                    let resp = IpcResponse::state(&controller.status(), controller.inhibit_path())
                        .with_outcome(&outcome);
                    if let Err(e) = ipc::write_response(&mut stream, &resp) {
                        log::warn!("Failed to answer IPC toggle: {}", e);
                    }
                }
            });
        if let Err(e) = spawned {
            log::error!("Failed to start toggle thread: {}", e);
        }
    }

    fn accept_ipc(&mut self, listener: &UnixListener) {
        loop {
            match listener.accept() {
                Ok((stream, _)) => self.handle_ipc(stream),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("IPC accept error: {}", e);
                    break;
                }
            }
        }
    }

    fn handle_ipc(&mut self, mut stream: UnixStream) {
        let _ = stream.set_nonblocking(false);
        let _ = stream.set_read_timeout(Some(IPC_READ_TIMEOUT));

        let cmd = match ipc::read_command(&stream) {
            Ok(cmd) => cmd,
            Err(e) => {
                let _ = ipc::write_response(&mut stream, &IpcResponse::err(format!("Invalid command: {}", e)));
                return;
            }
        };
        log::debug!("IPC command: {:?}", cmd);

        let response = match cmd {
            IpcCommand::Toggle => {
                // Answered from the toggle thread once the outcome is known
                self.spawn_toggle(Some(stream));
                return;
            }
            IpcCommand::Refresh => {
                let view = StatusView::from_state(self.controller.refresh());
                IpcResponse::state(&view, self.controller.inhibit_path())
            }
            IpcCommand::GetState => IpcResponse::state(&self.controller.status(), self.controller.inhibit_path()),
            IpcCommand::Quit => {
                self.signal.stop();
                IpcResponse::ok()
            }
        };

        if let Err(e) = ipc::write_response(&mut stream, &response) {
            log::warn!("Failed to write IPC response: {}", e);
        }
    }
}
