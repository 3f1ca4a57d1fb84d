//! serverctl: control tool for the serverd daemon.
//!
//! Turns its arguments into protocol lines, sends them over the control
//! socket, closes the write half and prints whatever the daemon answers.

use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "serverctl", about = "Control tool for the serverd daemon")]
struct Cli {
    /// Path of the daemon's control socket
    #[arg(short, long, env = "SERVERCTL_SOCKET", default_value = "/run/serverd/socket")]
    socket: PathBuf,

    #[command(subcommand)]
    command: Request,
}

#[derive(Subcommand, Debug)]
enum Request {
    /// Start one server, or every stopped one
    Start { name: Option<String> },
    /// Stop one server, or every running one
    Stop { name: Option<String> },
    /// Restart one server after the usual warning, or every running one
    Restart { name: Option<String> },
    /// Back up one server, or every running one with a backup directory
    Backup { name: Option<String> },
    /// Show the state of one or all servers
    Status { name: Option<String> },
    /// Print one JSON object per server
    Dump,
    /// Reload the definitions file
    Reload,
    /// Stop all servers and the daemon
    Quit,
    /// Send a line to a server's console
    User {
        name: String,
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
}

fn with_name(cmd: &str, name: Option<&String>) -> String {
    match name {
        Some(name) => format!("{cmd} {name}\n"),
        None => format!("{cmd}\n"),
    }
}

impl Request {
    fn to_lines(&self) -> String {
        match self {
            Self::Start { name } => with_name("start", name.as_ref()),
            Self::Stop { name } => with_name("stop", name.as_ref()),
            Self::Restart { name } => with_name("restart", name.as_ref()),
            Self::Backup { name } => with_name("backup", name.as_ref()),
            Self::Status { name } => with_name("status", name.as_ref()),
            Self::Dump => "dump\n".to_owned(),
            Self::Reload => "reload\n".to_owned(),
            Self::Quit => "quit\n".to_owned(),
            Self::User { name, text } => format!("user {name}\n{}\n", text.join(" ")),
        }
    }
}

fn send_unix(path: &Path, payload: &str) -> Result<String, Box<dyn std::error::Error>> {
    let mut stream = std::os::unix::net::UnixStream::connect(path)?;
    stream.write_all(payload.as_bytes())?;
    stream.shutdown(std::net::Shutdown::Write)?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    Ok(response)
}

fn main() {
    let cli = Cli::parse();

    match send_unix(&cli.socket, &cli.command.to_lines()) {
        Ok(response) => print!("{response}"),
        Err(e) => {
            eprintln!("Error communicating with serverd at {:?}: {e}", cli.socket);
            std::process::exit(1);
        }
    }
}
