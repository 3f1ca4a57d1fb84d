//! The table of all configured servers.
//!
//! One coarse mutex guards the whole table. Command dispatch and
//! reconciliation both run under it, so a reload never races a `start` and a
//! synchronous stop is finished before anyone else looks at the table again.

use crate::lock_ext::MutexExt;
use crate::services::Service;

use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

pub type ServiceTable = BTreeMap<String, Service>;

#[derive(Debug, Default)]
pub struct Registry {
    services: Mutex<ServiceTable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ServiceTable> {
        self.services.lock_poisoned()
    }

    /// Run `f` on the server called `name`. `None` if there is no such server.
    pub fn with_service<R>(&self, name: &str, f: impl FnOnce(&mut Service) -> R) -> Option<R> {
        self.lock().get_mut(name).map(f)
    }

    #[cfg(test)]
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Stop every running server, one after the other. Returns the names of
    /// the servers that were stopped.
    pub fn stop_all(&self) -> Vec<String> {
        let mut table = self.lock();
        let mut stopped = Vec::new();
        for (name, service) in table.iter_mut() {
            if !service.is_running() {
                continue;
            }
            info!("Stopping [{name}]");
            match service.stop() {
                Ok(()) => stopped.push(name.clone()),
                Err(e) => warn!("{e}"),
            }
        }
        stopped
    }
}
