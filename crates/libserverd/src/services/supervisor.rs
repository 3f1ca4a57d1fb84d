//! The worker thread of one running server.
//!
//! The worker is the only thread that touches the server's process. It runs
//! the lifecycle `Starting -> Running -> Stopping -> Stopped`: before hook,
//! notify, launch, then one mailbox command at a time until a stop, a crash
//! of the child or a failed (re)launch ends the loop. The unwind always
//! closes the mailbox, notifies, runs the after hook and marks the server as
//! stopped, in that order.

use super::backup::{BackupError, run_backup};
use super::descriptor::{Commandline, ServiceDescriptor};
use super::launcher::{ChildTermination, RunningProcess, append_to_log, launch, run_helper};
use super::mailbox::{Command, Mailbox};
use crate::config::SupervisorSettings;
use crate::lock_ext::MutexExt;

use chrono::{DateTime, Local};
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        })
    }
}

/// What the control side may observe about a worker.
#[derive(Clone, Debug)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub since: DateTime<Local>,
}

impl ServiceStatus {
    pub fn new(state: ServiceState) -> Self {
        Self {
            state,
            pid: None,
            since: Local::now(),
        }
    }
}

pub type SharedStatus = Arc<Mutex<ServiceStatus>>;

fn set_status(status: &SharedStatus, state: ServiceState, pid: Option<u32>) {
    let mut status = status.lock_poisoned();
    if status.state != state || status.pid != pid {
        status.since = Local::now();
    }
    status.state = state;
    status.pid = pid;
}

/// How the command loop ended.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum LoopExit {
    Stopped(ChildTermination),
    Exited(ChildTermination),
    RelaunchFailed,
}

struct Worker {
    desc: ServiceDescriptor,
    mailbox: Arc<Mailbox>,
    status: SharedStatus,
    settings: Arc<SupervisorSettings>,
}

/// Body of the worker thread. Returns once the server is fully stopped.
pub fn run_worker(
    desc: ServiceDescriptor,
    mailbox: Arc<Mailbox>,
    status: SharedStatus,
    settings: Arc<SupervisorSettings>,
) {
    let worker = Worker {
        desc,
        mailbox,
        status,
        settings,
    };
    worker.run();
}

impl Worker {
    fn name(&self) -> &str {
        &self.desc.name
    }

    fn run(&self) {
        set_status(&self.status, ServiceState::Starting, None);

        if let Some(before) = &self.desc.before {
            self.run_hook("before", before);
        }
        self.notify(&format!("Server {} is starting.", self.name()));

        match self.launch() {
            Some(process) => {
                info!("[{}] Started with pid {}", self.name(), process.pid());
                match self.command_loop(process) {
                    LoopExit::Stopped(exit) => {
                        info!("[{}] Stopped ({exit})", self.name());
                    }
                    LoopExit::Exited(exit) => {
                        warn!("[{}] Exited on its own ({exit})", self.name());
                        append_to_log(&self.desc, &format!("server exited on its own ({exit})"));
                    }
                    LoopExit::RelaunchFailed => {}
                }
            }
            None => set_status(&self.status, ServiceState::Stopping, None),
        }

        self.unwind();
    }

    fn launch(&self) -> Option<RunningProcess> {
        match launch(&self.desc, self.mailbox.clone()) {
            Ok(process) => {
                set_status(&self.status, ServiceState::Running, Some(process.pid()));
                Some(process)
            }
            Err(e) => {
                error!("[{}] Could not launch: {e}", self.name());
                append_to_log(&self.desc, &format!("could not launch: {e}"));
                None
            }
        }
    }

    fn unwind(&self) {
        let dropped = self.mailbox.close();
        if !dropped.is_empty() {
            debug!(
                "[{}] Dropping {} queued commands: {dropped:?}",
                self.name(),
                dropped.len()
            );
        }
        self.notify(&format!("Server {} has stopped.", self.name()));
        if let Some(after) = &self.desc.after {
            self.run_hook("after", after);
        }
        set_status(&self.status, ServiceState::Stopped, None);
        trace!("[{}] Worker exiting", self.name());
    }

    fn command_loop(&self, mut process: RunningProcess) -> LoopExit {
        while let Some(cmd) = self.mailbox.recv() {
            trace!("[{}] Handle {cmd:?}", self.name());
            match cmd {
                Command::Input(line) => {
                    if let Err(e) = process.send_line(&line) {
                        warn!("[{}] Could not write to console: {e}", self.name());
                    }
                }
                Command::Backup => {
                    // other failures were already reported by run_backup
                    if let Err(BackupError::NoBackupDirectory) =
                        run_backup(&self.desc, &mut process, &self.settings)
                    {
                        warn!("[{}] Backup requested but no backup directory is set", self.name());
                    }
                }
                Command::Restart => match self.restart(process) {
                    Some(relaunched) => process = relaunched,
                    None => return LoopExit::RelaunchFailed,
                },
                Command::Stop => return LoopExit::Stopped(self.stop(process)),
                Command::ChildExited(pid) if pid == process.pid() => {
                    set_status(&self.status, ServiceState::Stopping, None);
                    return LoopExit::Exited(process.wait(self.name(), None));
                }
                Command::ChildExited(pid) => {
                    trace!("[{}] Ignoring exit of previous process {pid}", self.name());
                }
            }
        }
        // Only the worker closes its mailbox, so this is unreachable in practice.
        // Stop the child anyway rather than leaking it.
        LoopExit::Stopped(self.stop(process))
    }

    fn send_stop(&self, process: &mut RunningProcess) {
        if let Err(e) = process.send_line(&self.settings.console.stop) {
            warn!("[{}] Could not send stop instruction: {e}", self.name());
        }
    }

    fn stop(&self, mut process: RunningProcess) -> ChildTermination {
        set_status(&self.status, ServiceState::Stopping, Some(process.pid()));
        self.notify(&format!("Server {} is stopping.", self.name()));
        self.send_stop(&mut process);
        let exit = process.wait(self.name(), self.settings.stop_timeout);
        set_status(&self.status, ServiceState::Stopping, None);
        exit
    }

    /// Warn, stop and relaunch without leaving `Running` and without hooks.
    fn restart(&self, mut process: RunningProcess) -> Option<RunningProcess> {
        let warning = self.settings.restart_warning;
        info!("[{}] Restarting in {} seconds", self.name(), warning.as_secs());
        let message = format!("Server restarting in {} seconds!", warning.as_secs());
        if let Err(e) = process.send_line(&self.settings.console.announce(&message)) {
            warn!("[{}] Could not send restart warning: {e}", self.name());
        }
        std::thread::sleep(warning);

        self.send_stop(&mut process);
        let exit = process.wait(self.name(), self.settings.stop_timeout);
        debug!("[{}] Old process exited with {exit}, relaunching", self.name());

        let relaunched = self.launch();
        match &relaunched {
            Some(process) => info!("[{}] Restarted with pid {}", self.name(), process.pid()),
            None => set_status(&self.status, ServiceState::Stopping, None),
        }
        relaunched
    }

    fn run_hook(&self, which: &str, hook: &Commandline) {
        let log_file = self.desc.log_file();
        if let Err(e) = run_helper(hook, &self.desc.working_directory, Some(&log_file)) {
            warn!("[{}] {which} hook failed: {e}", self.name());
        }
    }

    fn notify(&self, message: &str) {
        if let Some(notify) = &self.desc.notify {
            self.run_hook("notify", &notify.with_arg(message));
        }
    }
}
