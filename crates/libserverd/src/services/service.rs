use super::descriptor::ServiceDescriptor;
use super::mailbox::{Command, Mailbox};
use super::supervisor::{ServiceState, ServiceStatus, SharedStatus, run_worker};
use crate::config::SupervisorSettings;
use crate::lock_ext::MutexExt;

use log::{error, trace};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

#[derive(Debug)]
pub enum ServiceError {
    AlreadyRunning(String),
    NotRunning(String),
    NoBackupDirectory(String),
    SpawnWorker(String, std::io::Error),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::AlreadyRunning(name) => write!(f, "[{name}] is already running!"),
            Self::NotRunning(name) => write!(f, "[{name}] is not running!"),
            Self::NoBackupDirectory(name) => write!(f, "[{name}] has no backup directory!"),
            Self::SpawnWorker(name, e) => write!(f, "[{name}] could not start its worker: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// The producer side of a running worker.
#[derive(Debug)]
struct WorkerHandle {
    mailbox: Arc<Mailbox>,
    status: SharedStatus,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    fn join(self, name: &str) {
        if self.thread.join().is_err() {
            error!("Worker of [{name}] panicked");
        }
    }
}

/// Machine readable view of a server, one JSON object per line in `dump`.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub since: Option<String>,
    pub start_on_boot: bool,
    pub working_directory: PathBuf,
    pub log_file: PathBuf,
    pub backup_directory: Option<PathBuf>,
    pub queued_commands: usize,
}

/// One configured server. Holds a worker only while it is not `Stopped`.
#[derive(Debug)]
pub struct Service {
    pub descriptor: ServiceDescriptor,
    worker: Option<WorkerHandle>,
}

impl Service {
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            worker: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Release the worker if it already finished on its own (crash, failed launch).
    fn reap(&mut self) {
        if self
            .worker
            .as_ref()
            .is_some_and(|worker| worker.thread.is_finished())
        {
            if let Some(worker) = self.worker.take() {
                trace!("Reaping finished worker of [{}]", self.name());
                worker.join(&self.descriptor.name);
            }
        }
    }

    pub fn is_running(&mut self) -> bool {
        self.reap();
        self.worker.is_some()
    }

    pub fn status(&mut self) -> ServiceStatus {
        self.reap();
        match &self.worker {
            Some(worker) => worker.status.lock_poisoned().clone(),
            None => ServiceStatus::new(ServiceState::Stopped),
        }
    }

    pub fn pid(&mut self) -> Option<u32> {
        self.status().pid
    }

    pub fn start(&mut self, settings: &Arc<SupervisorSettings>) -> Result<(), ServiceError> {
        if self.is_running() {
            return Err(ServiceError::AlreadyRunning(self.name().to_owned()));
        }

        let mailbox = Arc::new(Mailbox::new());
        let status = Arc::new(Mutex::new(ServiceStatus::new(ServiceState::Starting)));
        let thread = {
            let desc = self.descriptor.clone();
            let mailbox = mailbox.clone();
            let status = status.clone();
            let settings = settings.clone();
            std::thread::Builder::new()
                .name(format!("server-{}", self.name()))
                .spawn(move || run_worker(desc, mailbox, status, settings))
                .map_err(|e| ServiceError::SpawnWorker(self.name().to_owned(), e))?
        };

        self.worker = Some(WorkerHandle {
            mailbox,
            status,
            thread,
        });
        Ok(())
    }

    /// Ask the worker to stop and wait until it has fully unwound, so a
    /// following `start` never overlaps with the old process.
    pub fn stop(&mut self) -> Result<(), ServiceError> {
        self.reap();
        let Some(worker) = self.worker.take() else {
            return Err(ServiceError::NotRunning(self.name().to_owned()));
        };
        // A closed mailbox means the worker is unwinding already; joining is enough
        let _ = worker.mailbox.send(Command::Stop);
        worker.join(&self.descriptor.name);
        Ok(())
    }

    fn dispatch(&mut self, cmd: Command) -> Result<(), ServiceError> {
        self.reap();
        let not_running = || ServiceError::NotRunning(self.descriptor.name.clone());
        let worker = self.worker.as_ref().ok_or_else(not_running)?;
        worker.mailbox.send(cmd).map_err(|_| not_running())
    }

    pub fn restart(&mut self) -> Result<(), ServiceError> {
        self.dispatch(Command::Restart)
    }

    pub fn backup(&mut self) -> Result<(), ServiceError> {
        if self.descriptor.backup_directory.is_none() {
            return Err(ServiceError::NoBackupDirectory(self.name().to_owned()));
        }
        self.dispatch(Command::Backup)
    }

    pub fn send_input(&mut self, line: String) -> Result<(), ServiceError> {
        self.dispatch(Command::Input(line))
    }

    pub fn snapshot(&mut self) -> ServiceSnapshot {
        let status = self.status();
        let queued_commands = self
            .worker
            .as_ref()
            .map_or(0, |worker| worker.mailbox.len());
        ServiceSnapshot {
            name: self.descriptor.name.clone(),
            state: status.state,
            pid: status.pid,
            since: self
                .worker
                .as_ref()
                .map(|_| status.since.to_rfc3339()),
            start_on_boot: self.descriptor.start_on_boot,
            working_directory: self.descriptor.working_directory.clone(),
            log_file: self.descriptor.log_file(),
            backup_directory: self.descriptor.backup_directory.clone(),
            queued_commands,
        }
    }
}

impl std::fmt::Display for ServiceSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{}] {}", self.name, self.state)?;
        if let Some(pid) = self.pid {
            write!(f, " (pid {pid})")?;
        }
        if let Some(since) = &self.since {
            write!(f, " since {since}")?;
        }
        Ok(())
    }
}
