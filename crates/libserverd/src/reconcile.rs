//! Bring the registry in line with a freshly loaded set of definitions.
//!
//! Loading and validating happens before the registry is touched, so a bad
//! definitions file leaves every server exactly as it was. Once the new set
//! is known to be good it is applied in one go under the registry lock:
//!
//! 1. new names are inserted and started if they are marked `default=yes`
//! 2. changed names get the new descriptor. If the process would run
//!    differently (user, group, path, run, log) and it is running, it is
//!    stopped first and started again afterwards
//! 3. names that are gone are stopped and removed
//!
//! Servers whose definition did not change are not touched at all.

use crate::config::SupervisorSettings;
use crate::definitions::{ConfigError, load_definitions};
use crate::registry::Registry;
use crate::runtime_info::RuntimeInfo;
use crate::services::{Service, ServiceDescriptor};

use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Names touched by one reconciliation, by what happened to them.
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub restarted: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} restarted, {} removed, {} unchanged",
            self.added.len(),
            self.updated.len(),
            self.restarted.len(),
            self.removed.len(),
            self.unchanged.len()
        )
    }
}

fn start_logged(service: &mut Service, settings: &Arc<SupervisorSettings>) {
    match service.start(settings) {
        Ok(()) => info!("Started [{}]", service.name()),
        Err(e) => warn!("{e}"),
    }
}

/// Apply an already validated set of descriptors to `registry`.
pub fn reconcile(
    registry: &Registry,
    descriptors: Vec<ServiceDescriptor>,
    settings: &Arc<SupervisorSettings>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let mut table = registry.lock();
    let wanted: HashSet<String> = descriptors.iter().map(|desc| desc.name.clone()).collect();

    for desc in descriptors {
        let name = desc.name.clone();
        let Some(service) = table.get_mut(&name) else {
            debug!("New server [{name}]");
            let mut service = Service::new(desc);
            if service.descriptor.start_on_boot {
                start_logged(&mut service, settings);
            }
            table.insert(name.clone(), service);
            report.added.push(name);
            continue;
        };

        if service.descriptor == desc {
            report.unchanged.push(name);
            continue;
        }

        if service.descriptor.identity_differs(&desc) && service.is_running() {
            info!("[{name}] changed how it has to be run, stopping it to apply the change");
            if let Err(e) = service.stop() {
                warn!("{e}");
            }
            service.descriptor = desc;
            // It was running before, so it runs again
            start_logged(service, settings);
            report.restarted.push(name);
        } else {
            debug!("[{name}] updated, takes effect on next start");
            service.descriptor = desc;
            report.updated.push(name);
        }
    }

    let gone: Vec<String> = table
        .keys()
        .filter(|name| !wanted.contains(*name))
        .cloned()
        .collect();
    for name in gone {
        if let Some(mut service) = table.remove(&name) {
            info!("[{name}] is no longer in the definitions file");
            if service.is_running() {
                if let Err(e) = service.stop() {
                    warn!("{e}");
                }
            }
        }
        report.removed.push(name);
    }

    report
}

/// Load the definitions file again and reconcile. On an error nothing changes.
pub fn reload(run_info: &RuntimeInfo) -> Result<ReconcileReport, ConfigError> {
    let descriptors = load_definitions(&run_info.config.definitions_path)?;
    let report = reconcile(&run_info.registry, descriptors, &run_info.settings);
    info!("Reloaded definitions: {report}");
    Ok(report)
}
