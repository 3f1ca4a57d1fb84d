//! `libserverd` is the core library of the serverd supervisor daemon,
//! shared by the daemon binary (`serverd`) and its tests.
//!
//! It contains:
//! - Parsing and validation of the declarative server definitions
//! - The per-server supervisor: command mailbox, worker thread, lifecycle
//! - Process launching with uid/gid drop and per-server log files
//! - The registry of servers and the reconciliation engine used on reload
//! - The line based control protocol and the control socket
//! - Daemon plumbing: settings, logging, signals, daemonization

pub mod config;
pub mod control;
pub mod definitions;
pub mod entrypoints;
pub mod lock_ext;
pub mod logging;
pub mod platform;
pub mod reconcile;
pub mod registry;
pub mod runtime_info;
pub mod services;
pub mod shutdown;
pub mod signal_handler;

#[cfg(test)]
mod tests;
