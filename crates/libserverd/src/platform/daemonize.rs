use log::{trace, warn};
use std::path::Path;

/// Detach from the controlling terminal. The working directory stays the same so
/// relative paths in the definitions keep resolving.
pub fn daemonize() -> Result<(), String> {
    nix::unistd::daemon(true, false).map_err(|e| format!("Could not daemonize: {e}"))
}

pub fn write_pid_file(path: &Path) -> Result<(), String> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Could not create directory for pid file {path:?}: {e}"))?;
    }
    let pid = nix::unistd::getpid();
    std::fs::write(path, format!("{pid}\n"))
        .map_err(|e| format!("Could not write pid file {path:?}: {e}"))?;
    trace!("Wrote pid {pid} to {path:?}");
    Ok(())
}

pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Could not remove pid file {path:?}: {e}");
    }
}
