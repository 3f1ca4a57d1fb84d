//! Settings of the daemon itself.
//!
//! The servers are described in the definitions file (see `definitions`);
//! everything else (where that file lives, the control socket, timings and
//! the console instructions understood by the children) comes from the
//! command line.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DEFINITIONS_PATH: &str = "/etc/serverd.conf";
pub const DEFAULT_SOCKET_PATH: &str = "/run/serverd/socket";

#[derive(Parser, Debug)]
#[command(name = "serverd", about = "Supervisor daemon for long running game and application servers")]
pub struct CliArgs {
    /// File containing the [server] definitions
    #[arg(short, long, default_value = DEFAULT_DEFINITIONS_PATH)]
    pub config: PathBuf,

    /// Path of the control socket
    #[arg(short, long, default_value = DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,

    /// Where to write the pid of the daemon
    #[arg(long)]
    pub pid_file: Option<PathBuf>,

    /// Detach from the terminal after loading the definitions
    #[arg(short, long)]
    pub daemon: bool,

    /// Only check the definitions file and exit
    #[arg(short, long)]
    pub test: bool,

    #[arg(long, default_value = "info")]
    pub log_level: log::LevelFilter,

    /// Additionally append the daemon log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Seconds between the restart warning and the actual restart
    #[arg(long, default_value_t = 10)]
    pub restart_warning: u64,

    /// Seconds to let a server flush its state before a backup is taken
    #[arg(long, default_value_t = 5)]
    pub backup_flush: u64,

    /// Seconds to wait for a server to exit before signalling it. Waits forever if unset
    #[arg(long)]
    pub stop_timeout: Option<u64>,
}

#[derive(Debug)]
pub struct LoggingConfig {
    pub log_to_stdout: bool,
    pub log_file: Option<PathBuf>,
    pub level: log::LevelFilter,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub definitions_path: PathBuf,
    pub socket_path: PathBuf,
    pub pid_file: Option<PathBuf>,
    pub supervision: SupervisorSettings,
}

/// Lines written to a server's stdin to drive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleCommands {
    pub stop: String,
    pub save_off: String,
    pub save_all: String,
    pub save_on: String,
    /// Prefix for messages broadcast to the players
    pub say: String,
}

impl Default for ConsoleCommands {
    fn default() -> Self {
        Self {
            stop: "stop".to_owned(),
            save_off: "save-off".to_owned(),
            save_all: "save-all".to_owned(),
            save_on: "save-on".to_owned(),
            say: "say".to_owned(),
        }
    }
}

impl ConsoleCommands {
    pub fn announce(&self, message: &str) -> String {
        format!("{} {message}", self.say)
    }
}

/// Everything a worker needs to know besides its own descriptor.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub console: ConsoleCommands,
    pub restart_warning: Duration,
    pub backup_flush: Duration,
    pub stop_timeout: Option<Duration>,
    pub archiver: String,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            console: ConsoleCommands::default(),
            restart_warning: Duration::from_secs(10),
            backup_flush: Duration::from_secs(5),
            stop_timeout: None,
            archiver: "tar".to_owned(),
        }
    }
}

pub fn load_config(args: &CliArgs) -> (LoggingConfig, Config) {
    let supervision = SupervisorSettings {
        restart_warning: Duration::from_secs(args.restart_warning),
        backup_flush: Duration::from_secs(args.backup_flush),
        stop_timeout: args.stop_timeout.map(Duration::from_secs),
        ..SupervisorSettings::default()
    };

    let config = Config {
        definitions_path: args.config.clone(),
        socket_path: args.socket.clone(),
        pid_file: args.pid_file.clone(),
        supervision,
    };

    let logging_config = LoggingConfig {
        log_to_stdout: true,
        log_file: args.log_file.clone(),
        level: args.log_level,
    };

    (logging_config, config)
}
