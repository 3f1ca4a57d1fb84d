//! The `RuntimeInfo` holds everything the daemon threads share: the registry
//! of servers and the daemon settings. There is only ever one, passed around
//! as an `ArcRuntimeInfo`.

use crate::config::{Config, SupervisorSettings};
use crate::registry::Registry;

use std::sync::Arc;

pub struct RuntimeInfo {
    pub registry: Registry,
    pub config: Config,
    /// Handed to every worker on start
    pub settings: Arc<SupervisorSettings>,
}

impl RuntimeInfo {
    pub fn new(config: Config) -> Self {
        let settings = Arc::new(config.supervision.clone());
        Self {
            registry: Registry::new(),
            config,
            settings,
        }
    }
}

pub type ArcRuntimeInfo = Arc<RuntimeInfo>;
