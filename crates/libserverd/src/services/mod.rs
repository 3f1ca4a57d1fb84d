//! Everything about a single server: its descriptor, the mailbox feeding its
//! worker, the worker itself and the processes it launches.

mod backup;
mod descriptor;
mod launcher;
mod mailbox;
mod service;
mod supervisor;

pub use backup::*;
pub use descriptor::*;
pub use launcher::*;
pub use mailbox::*;
pub use service::*;
pub use supervisor::*;
