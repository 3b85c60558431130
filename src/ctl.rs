use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use crate::ipc::{self, IpcResponse};

#[derive(Parser, Debug)]
#[command(name = "ctl", about = "Control a running touchpad-tray instance")]
pub struct CtlArgs {
    /// Override socket path
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Toggle the touchpad (prompts for authentication)
    Toggle,
    /// Re-read the touchpad state and update the tray
    Refresh,
    /// Print current state as JSON
    State,
    /// Shut down touchpad-tray
    Quit,
    /// Generate shell completions for the ctl subcommand
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn send_command(socket: &PathBuf, cmd: serde_json::Value) -> Result<IpcResponse> {
    let mut stream = UnixStream::connect(socket)
        .with_context(|| format!("Failed to connect to touchpad-tray at {}", socket.display()))?;

    let msg = serde_json::to_string(&cmd)? + "\n";
    stream.write_all(msg.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response = String::new();
    reader.read_line(&mut response)?;

    let resp: IpcResponse = serde_json::from_str(&response)
        .context("Failed to parse response from touchpad-tray")?;
    Ok(resp)
}

pub fn run(args: CtlArgs) -> Result<()> {
    // Handle completions before connecting to socket
    if let Commands::Completions { shell } = &args.command {
        let mut cmd = crate::Cli::command();
        clap_complete::generate(*shell, &mut cmd, "touchpad-tray", &mut std::io::stdout());
        return Ok(());
    }

    let sock = ipc::socket_path(args.socket.as_ref());

    let cmd = match &args.command {
        Commands::Toggle => json!({"cmd": "toggle"}),
        Commands::Refresh => json!({"cmd": "refresh"}),
        Commands::State => json!({"cmd": "get-state"}),
        Commands::Quit => json!({"cmd": "quit"}),
        Commands::Completions { .. } => unreachable!("handled above"),
    };

    let resp = send_command(&sock, cmd)?;

    if !resp.ok {
        let err = resp.error.as_deref().unwrap_or("Unknown error");
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    match &args.command {
        Commands::State => println!("{}", serde_json::to_string_pretty(&resp)?),
        Commands::Toggle => {
            if let Some(message) = &resp.message {
                println!("{}", message);
            }
            // Non-success outcomes still leave the tray running; report them in the exit code
            if resp.outcome.as_deref() != Some("succeeded") {
                std::process::exit(2);
            }
        }
        Commands::Refresh => {
            if let Some(status) = &resp.status {
                println!("Touchpad {}", status);
            }
        }
        _ => {}
    }

    Ok(())
}
