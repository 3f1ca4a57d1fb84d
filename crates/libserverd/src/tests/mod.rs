mod lifecycle;
mod reconcile;

use crate::config::{Config, SupervisorSettings};
use crate::runtime_info::RuntimeInfo;
use crate::services::{Commandline, ServiceDescriptor};

use nix::unistd::{getgid, getuid};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Echoes every console line into the log. Exits on `stop`, fails on `crash`.
pub const ECHO_SCRIPT: &str =
    r#"while read -r l; do echo "$l"; case "$l" in stop) exit 0;; crash) exit 3;; esac; done"#;

fn find_bin(cmd: &str) -> String {
    for dir in &[
        "/usr/bin",
        "/bin",
        "/usr/local/bin",
        "/run/current-system/sw/bin",
    ] {
        let path = format!("{dir}/{cmd}");
        if Path::new(&path).exists() {
            return path;
        }
    }
    panic!("Could not find `{cmd}` in any standard location");
}

pub fn sh() -> String {
    find_bin("sh")
}

pub fn sh_commandline(script: &str) -> Commandline {
    Commandline {
        cmd: sh(),
        args: vec!["-c".to_owned(), script.to_owned()],
    }
}

/// A server running `ECHO_SCRIPT` as the current user in `dir`.
pub fn echo_service(name: &str, dir: &Path) -> ServiceDescriptor {
    ServiceDescriptor {
        name: name.to_owned(),
        user: getuid(),
        group: getgid(),
        working_directory: dir.to_path_buf(),
        log_directory: None,
        run: sh_commandline(ECHO_SCRIPT),
        before: None,
        after: None,
        notify: None,
        backup_directory: None,
        start_on_boot: false,
    }
}

pub fn test_settings() -> Arc<SupervisorSettings> {
    Arc::new(SupervisorSettings {
        restart_warning: Duration::from_millis(50),
        backup_flush: Duration::from_millis(50),
        stop_timeout: Some(Duration::from_secs(5)),
        archiver: find_bin("tar"),
        ..SupervisorSettings::default()
    })
}

pub fn test_runtime_info(definitions_path: PathBuf, dir: &Path) -> RuntimeInfo {
    let settings = test_settings();
    RuntimeInfo::new(Config {
        definitions_path,
        socket_path: dir.join("control.socket"),
        pid_file: None,
        supervision: (*settings).clone(),
    })
}

/// A definitions block for `ECHO_SCRIPT`, usable as file content.
pub fn echo_block(name: &str, dir: &Path, extra: &str) -> String {
    format!(
        "[{name}]\nuser={}\ngroup={}\npath={}\nrun={} -c '{ECHO_SCRIPT}'\n{extra}\n",
        getuid(),
        getgid(),
        dir.display(),
        sh()
    )
}

pub fn read_file(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

/// Poll `cond` until it holds, failing the test after ten seconds.
pub fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "timed out waiting for {what}"
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// A zombie waiting for its (possibly new) parent to reap it counts as dead.
pub fn pid_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(") ")
            .is_some_and(|(_, fields)| !fields.starts_with('Z')),
        Err(_) => nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok(),
    }
}

/// Run a test body on its own thread and fail if it does not finish in time,
/// so a stuck child or worker never hangs the whole test run.
pub fn with_timeout(name: &str, f: impl FnOnce() + Send + 'static) {
    let handle = std::thread::spawn(f);

    let timeout = Duration::from_secs(60);
    let start = Instant::now();

    loop {
        if handle.is_finished() {
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
            return;
        }
        assert!(
            start.elapsed() < timeout,
            "{name} timed out after {timeout:?}, a worker or child is probably stuck"
        );
        std::thread::sleep(Duration::from_millis(50));
    }
}
