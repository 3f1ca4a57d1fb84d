//! Thin wrappers around the OS facilities the daemon needs.

pub mod daemonize;
pub mod identity;

pub use daemonize::*;
pub use identity::*;
