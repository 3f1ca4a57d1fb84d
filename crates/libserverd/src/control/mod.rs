//! Control of the daemon over a unix socket. `protocol` turns lines into
//! requests, `control` executes them against the registry and runs the
//! accept loop.

#[allow(clippy::module_inception)]
mod control;
mod protocol;

pub use control::*;
pub use protocol::*;
