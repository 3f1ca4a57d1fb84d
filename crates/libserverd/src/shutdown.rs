//! Orderly exit of the daemon: every server is stopped the normal way (stop
//! instruction, wait, notify, after hook) before the socket and pid file go.

use crate::runtime_info::RuntimeInfo;

use log::{info, trace, warn};
use std::path::Path;

fn remove_file_logged(what: &str, path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => trace!("Removed {what} {path:?}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {what} {path:?}: {e}"),
    }
}

/// Stop all servers and clean up after the daemon, without exiting.
pub fn shutdown_servers_and_cleanup(run_info: &RuntimeInfo) {
    let stopped = run_info.registry.stop_all();
    info!("Stopped {} servers", stopped.len());

    remove_file_logged("control socket", &run_info.config.socket_path);
    if let Some(pid_file) = &run_info.config.pid_file {
        crate::platform::remove_pid_file(pid_file);
    }
}

pub fn shutdown_sequence(run_info: &RuntimeInfo) -> ! {
    info!("Daemon shutting down");
    shutdown_servers_and_cleanup(run_info);
    info!("Shutdown finished");
    std::process::exit(0);
}
