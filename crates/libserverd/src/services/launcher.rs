//! Spawning of the main server process and of the short lived helpers (hooks,
//! the backup archiver).
//!
//! The main process gets a pipe as stdin, owned by the worker, and appends its
//! stdout/stderr to the server's log file. A waiter thread owns the `Child`,
//! reaps it, reports the termination over a channel and tells the worker via
//! its mailbox. That way an unexpected exit wakes the worker up, and nothing
//! is ever left as a zombie.

use super::descriptor::{Commandline, ServiceDescriptor};
use super::mailbox::{Command, Mailbox};

use log::{error, trace, warn};
use nix::sys::signal::Signal;
use nix::unistd::{Gid, Pid, Uid};
use std::io::Write;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum ChildTermination {
    Signal(Signal),
    Exit(i32),
    /// The waiter could not collect an exit status
    Lost,
}

impl From<ExitStatus> for ChildTermination {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exit(code);
        }
        status
            .signal()
            .and_then(|raw| Signal::try_from(raw).ok())
            .map_or(Self::Lost, Self::Signal)
    }
}

impl std::fmt::Display for ChildTermination {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Signal(sig) => write!(f, "signal {sig}"),
            Self::Exit(code) => write!(f, "exit code {code}"),
            Self::Lost => write!(f, "unknown status"),
        }
    }
}

impl ChildTermination {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Exit(0))
    }
}

#[derive(Debug)]
pub enum LaunchError {
    Resolve(String, String),
    LogFile(PathBuf, std::io::Error),
    Spawn(String, std::io::Error),
    Waiter(String, std::io::Error),
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Resolve(cmd, e) => {
                write!(f, "could not resolve {cmd} to an executable file: {e}")
            }
            Self::LogFile(path, e) => write!(f, "could not open log file {path:?}: {e}"),
            Self::Spawn(cmd, e) => write!(f, "{cmd} failed to spawn with: {e}"),
            Self::Waiter(cmd, e) => write!(f, "could not start waiter thread for {cmd}: {e}"),
        }
    }
}

impl std::error::Error for LaunchError {}

#[derive(Debug)]
pub enum HookError {
    Spawn(String, std::io::Error),
    Wait(String, std::io::Error),
    BadExitCode(String, ChildTermination),
}

impl std::fmt::Display for HookError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Spawn(cmd, e) => write!(f, "{cmd} failed to spawn with: {e}"),
            Self::Wait(cmd, e) => write!(f, "{cmd} could not be waited on because: {e}"),
            Self::BadExitCode(cmd, exit) => write!(f, "{cmd} exited with: {exit}"),
        }
    }
}

impl std::error::Error for HookError {}

/// The main process of a running server, as seen by its worker.
#[derive(Debug)]
pub struct RunningProcess {
    pid: u32,
    stdin: ChildStdin,
    exited: Receiver<ChildTermination>,
    waiter: std::thread::JoinHandle<()>,
}

impl RunningProcess {
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Write one newline terminated line to the server's console.
    pub fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()
    }

    /// Wait until the process is reaped. With a timeout the process first gets
    /// SIGTERM and then SIGKILL, one timeout apart. Without one this waits as
    /// long as it takes.
    pub fn wait(self, name: &str, timeout: Option<Duration>) -> ChildTermination {
        let Self {
            pid,
            stdin,
            exited,
            waiter,
        } = self;
        // EOF on the console, some servers only stop reading there
        drop(stdin);

        let termination = match timeout {
            None => exited.recv().ok(),
            Some(timeout) => wait_escalating(name, pid, &exited, timeout),
        };
        if waiter.join().is_err() {
            error!("Waiter thread of {name} (pid {pid}) panicked");
        }
        termination.unwrap_or(ChildTermination::Lost)
    }
}

fn wait_escalating(
    name: &str,
    pid: u32,
    exited: &Receiver<ChildTermination>,
    timeout: Duration,
) -> Option<ChildTermination> {
    for signal in [Signal::SIGTERM, Signal::SIGKILL] {
        match exited.recv_timeout(timeout) {
            Ok(termination) => return Some(termination),
            Err(RecvTimeoutError::Disconnected) => return None,
            Err(RecvTimeoutError::Timeout) => {
                warn!("[{name}] did not exit within {timeout:?}, sending {signal}");
                // the child leads its own process group, take down everything it forked
                if let Err(e) = nix::sys::signal::killpg(Pid::from_raw(pid as i32), signal) {
                    warn!("[{name}] could not send {signal} to process group {pid}: {e}");
                }
            }
        }
    }
    exited.recv().ok()
}

fn open_log_file(path: &Path) -> Result<std::fs::File, LaunchError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| LaunchError::LogFile(path.to_path_buf(), e))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LaunchError::LogFile(path.to_path_buf(), e))
}

/// Append a line from the daemon itself to the server's log file.
pub fn append_to_log(desc: &ServiceDescriptor, msg: &str) {
    let path = desc.log_file();
    let written = open_log_file(&path).and_then(|mut file| {
        writeln!(
            file,
            "{} [serverd] {msg}",
            chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]")
        )
        .map_err(|e| LaunchError::LogFile(path.clone(), e))
    });
    if let Err(e) = written {
        warn!("[{}] {e}", desc.name);
    }
}

fn drop_privileges(uid: Uid, gid: Gid) -> std::io::Result<()> {
    if nix::unistd::geteuid().is_root() {
        nix::unistd::setgroups(&[gid])?;
    }
    nix::unistd::setgid(gid)?;
    nix::unistd::setuid(uid)?;
    Ok(())
}

/// Start the main process of `desc`. The returned handle is the only way to
/// talk to it.
pub fn launch(desc: &ServiceDescriptor, mailbox: Arc<Mailbox>) -> Result<RunningProcess, LaunchError> {
    let name = desc.name.as_str();
    let run = &desc.run;

    let cmd_path = which::which_in(&run.cmd, std::env::var_os("PATH"), &desc.working_directory)
        .map_err(|e| LaunchError::Resolve(run.cmd.clone(), e.to_string()))?;

    let log = open_log_file(&desc.log_file())?;
    let log_err = log
        .try_clone()
        .map_err(|e| LaunchError::LogFile(desc.log_file(), e))?;

    let mut cmd = std::process::Command::new(&cmd_path);
    cmd.args(&run.args)
        .current_dir(&desc.working_directory)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .process_group(0);
    let (uid, gid) = (desc.user, desc.group);
    // SAFETY: only async-signal-safe syscalls (setgroups/setgid/setuid) run between fork and exec
    unsafe {
        cmd.pre_exec(move || drop_privileges(uid, gid));
    }

    trace!("Start main executable for server {name}: {cmd_path:?} {:?}", run.args);
    let mut child = cmd
        .spawn()
        .map_err(|e| LaunchError::Spawn(run.to_string(), e))?;
    let pid = child.id();

    let Some(stdin) = child.stdin.take() else {
        // Stdio::piped() always yields a handle, treat it like a failed spawn anyway
        let _ = child.kill();
        let _ = child.wait();
        return Err(LaunchError::Spawn(
            run.to_string(),
            std::io::Error::other("no stdin pipe"),
        ));
    };

    let (exited_tx, exited) = mpsc::channel();
    let waiter_name = name.to_owned();
    let waiter = std::thread::Builder::new()
        .name(format!("{name}-waiter"))
        .spawn(move || {
            let termination = match child.wait() {
                Ok(status) => ChildTermination::from(status),
                Err(e) => {
                    error!("Could not wait on {waiter_name} (pid {pid}): {e}");
                    ChildTermination::Lost
                }
            };
            trace!("Main process of {waiter_name} (pid {pid}) exited with {termination}");
            let _ = exited_tx.send(termination);
            // The worker might be gone already, nobody needs the event then
            let _ = mailbox.send(Command::ChildExited(pid));
        })
        .map_err(|e| {
            // the closure and with it the Child are gone, do not leave the process behind
            let _ = nix::sys::signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            LaunchError::Waiter(run.to_string(), e)
        })?;

    Ok(RunningProcess {
        pid,
        stdin,
        exited,
        waiter,
    })
}

/// Run a helper to completion in `working_directory`, with the daemon's own
/// identity. Output goes to `log_file` when given.
pub fn run_helper(
    cmdline: &Commandline,
    working_directory: &Path,
    log_file: Option<&Path>,
) -> Result<(), HookError> {
    let mut cmd = cmdline.to_command();
    if working_directory.is_dir() {
        cmd.current_dir(working_directory);
    }
    cmd.stdin(Stdio::null());
    if let Some(path) = log_file {
        if let Ok(out) = open_log_file(path) {
            if let Ok(err) = out.try_clone() {
                cmd.stderr(Stdio::from(err));
            }
            cmd.stdout(Stdio::from(out));
        }
    }

    trace!("Run helper {cmdline}");
    let mut child = cmd
        .spawn()
        .map_err(|e| HookError::Spawn(cmdline.to_string(), e))?;
    let status = child
        .wait()
        .map_err(|e| HookError::Wait(cmdline.to_string(), e))?;
    let termination = ChildTermination::from(status);
    if termination.success() {
        Ok(())
    } else {
        Err(HookError::BadExitCode(cmdline.to_string(), termination))
    }
}
