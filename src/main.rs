mod config;
mod controller;
mod ctl;
mod daemon;
mod device;
mod ipc;
mod notify;
mod privilege;
mod state;
mod tray;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "touchpad-tray", version, about = "Toggle the touchpad from the system tray")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input device id (e.g. event10), or "auto" to detect the touchpad
    #[arg(short, long, env = "TOUCHPAD_TRAY_DEVICE")]
    device: Option<String>,

    /// Use this inhibit attribute directly instead of resolving the device id
    #[arg(long)]
    inhibit_path: Option<PathBuf>,

    /// Override IPC socket path
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Log notifications instead of showing them
    #[arg(long)]
    no_notify: bool,

    /// Run without a tray icon (control through `ctl`)
    #[arg(long)]
    no_tray: bool,

    /// Generate shell completions and exit
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Control a running touchpad-tray instance
    Ctl(ctl::CtlArgs),
    /// List input devices and their inhibit state
    Devices,
    /// Store the device id in the config file
    SetDevice {
        /// Input device id such as event10, or "auto"
        id: String,
    },
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match cli.command.take() {
        Some(CliCommand::Ctl(args)) => ctl::run(args),
        Some(CliCommand::Devices) => list_devices(&cli),
        Some(CliCommand::SetDevice { id }) => {
            let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
            config::save_device_to_config(&config_path, &id)
        }
        None => run_daemon(cli),
    }
}

fn load_config(args: &Cli, generate: bool) -> Result<(config::TrayConfig, PathBuf)> {
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = if generate {
        config::load_config(&config_path)?
    } else {
        config::read_config(&config_path)?
    };

    // Apply CLI overrides
    if let Some(id) = &args.device {
        config.device.id = id.clone();
        config.device.inhibit_path = None;
    }
    if let Some(path) = &args.inhibit_path {
        config.device.inhibit_path = Some(path.clone());
    }
    if args.no_notify {
        config.notifications.enabled = false;
    }

    Ok((config, config_path))
}

fn list_devices(args: &Cli) -> Result<()> {
    let (config, _) = load_config(args, false)?;
    for dev in device::list_devices(&config.device.input_root)? {
        let state = dev.state.map_or("-", |s| s.label());
        let marker = if dev.looks_like_touchpad() { "*" } else { " " };
        println!("{} {:<8} {:<9} {}", marker, dev.id, state, dev.name);
    }
    Ok(())
}

fn run_daemon(args: Cli) -> Result<()> {
    if let Some(shell) = args.completions {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "touchpad-tray", &mut std::io::stdout());
        return Ok(());
    }

    let (config, config_path) = load_config(&args, true)?;
    let inhibit_path = device::resolve(&config.device)?;

    log::info!(
        "Starting touchpad-tray with device={}, config={}",
        config.device.id,
        config_path.display()
    );
    log::info!(
        "Privilege helper: {} {} (timeout {}s), refresh every {}ms",
        config.privilege.helper,
        config.privilege.shell,
        config.privilege.timeout_secs,
        config.refresh.interval_ms
    );

    let opts = daemon::DaemonOptions {
        inhibit_path,
        socket: ipc::socket_path(args.socket.as_ref()),
        tray: !args.no_tray,
    };
    daemon::run(config, opts)
}
