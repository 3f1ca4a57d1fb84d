//! Handle signals sent to the daemon from the outside.
//!
//! Children are reaped by their own waiter threads, so SIGCHLD is not handled
//! here. SIGHUP reloads the definitions like the `reload` request does.

use crate::reconcile::reload;
use crate::runtime_info::ArcRuntimeInfo;

use log::{info, warn};
use signal_hook::iterator::Signals;

pub const HANDLED_SIGNALS: [libc::c_int; 4] = [
    signal_hook::consts::SIGTERM,
    signal_hook::consts::SIGINT,
    signal_hook::consts::SIGQUIT,
    signal_hook::consts::SIGHUP,
];

pub fn handle_signals(mut signals: Signals, run_info: ArcRuntimeInfo) {
    for signal in signals.forever() {
        match signal as libc::c_int {
            signal_hook::consts::SIGHUP => {
                info!("Received SIGHUP, reloading definitions");
                if let Err(e) = reload(&run_info) {
                    warn!("Reload failed: {e}");
                }
            }
            signal_hook::consts::SIGTERM
            | signal_hook::consts::SIGINT
            | signal_hook::consts::SIGQUIT => {
                info!("Received termination signal {signal}");
                crate::shutdown::shutdown_sequence(&run_info);
            }
            _ => unreachable!(),
        }
    }
}
