use clap::Parser;
use log::{error, info, trace};
use signal_hook::iterator::Signals;
use std::sync::Arc;

use crate::config::{self, CliArgs};
use crate::control;
use crate::definitions::{ConfigError, load_definitions};
use crate::logging;
use crate::platform;
use crate::reconcile::reconcile;
use crate::runtime_info::{ArcRuntimeInfo, RuntimeInfo};
use crate::signal_handler;

#[derive(Debug)]
pub enum DaemonError {
    Logging(String),
    Definitions(ConfigError),
    Daemonize(String),
    Socket(String),
    Signals(std::io::Error),
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Logging(e) | Self::Daemonize(e) | Self::Socket(e) => f.write_str(e),
            Self::Definitions(e) => write!(f, "{e}"),
            Self::Signals(e) => write!(f, "Couldnt setup listening to the signals: {e}"),
        }
    }
}

impl std::error::Error for DaemonError {}

impl From<ConfigError> for DaemonError {
    fn from(e: ConfigError) -> Self {
        Self::Definitions(e)
    }
}

pub fn run_daemon() {
    let cli_args = CliArgs::parse();
    if let Err(e) = start_daemon(&cli_args) {
        error!("{e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn start_daemon(cli_args: &CliArgs) -> Result<(), DaemonError> {
    let (log_conf, conf) = config::load_config(cli_args);
    logging::setup_logging(&log_conf).map_err(DaemonError::Logging)?;

    let descriptors = load_definitions(&conf.definitions_path)?;
    if cli_args.test {
        println!("Config file OK.");
        return Ok(());
    }

    // Before any thread exists, fork() only keeps the calling thread
    if cli_args.daemon {
        platform::daemonize().map_err(DaemonError::Daemonize)?;
    }
    if let Some(pid_file) = &conf.pid_file {
        platform::write_pid_file(pid_file).map_err(DaemonError::Daemonize)?;
    }

    let listener = control::open_control_socket(&conf.socket_path).map_err(DaemonError::Socket)?;
    let run_info: ArcRuntimeInfo = Arc::new(RuntimeInfo::new(conf));

    let signals = Signals::new(signal_handler::HANDLED_SIGNALS).map_err(DaemonError::Signals)?;
    let handle = start_signal_handler_thread(signals, run_info.clone());

    let report = reconcile(&run_info.registry, descriptors, &run_info.settings);
    info!("Loaded definitions: {report}");

    // listen on requests like start/stop/reload
    control::accept_control_connections_unix_socket(run_info.clone(), listener);
    trace!("Started all helper threads");

    if handle.join().is_err() {
        error!("Signal handler thread panicked");
        crate::shutdown::shutdown_sequence(&run_info);
    }
    Ok(())
}

fn start_signal_handler_thread(
    signals: Signals,
    run_info: ArcRuntimeInfo,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        signal_handler::handle_signals(signals, run_info);
    })
}
