//! Poison-recovering lock extension traits.
//!
//! A worker thread that panics while holding a mailbox or registry lock would
//! otherwise poison it and take every other server down with it. The daemon
//! keeps going instead: the inner data is recovered from the `PoisonError`.
//!
//! ```ignore
//! use crate::lock_ext::{CondvarExt, MutexExt};
//!
//! let mut queue = mailbox.queue.lock_poisoned();
//! queue = mailbox.ready.wait_poisoned(queue);
//! ```

use std::sync::{Condvar, Mutex, MutexGuard};

/// Extension trait that adds a poison-recovering `lock` to `Mutex`.
pub trait MutexExt<T> {
    fn lock_poisoned(&self) -> MutexGuard<'_, T>;
}

/// Extension trait that adds a poison-recovering `wait` to `Condvar`.
pub trait CondvarExt {
    fn wait_poisoned<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn lock_poisoned(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|e| {
            log::warn!("Recovered poisoned Mutex (a thread panicked while holding this lock)");
            e.into_inner()
        })
    }
}

impl CondvarExt for Condvar {
    fn wait_poisoned<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.wait(guard).unwrap_or_else(|e| {
            log::warn!("Recovered poisoned Mutex while waiting on a condition variable");
            e.into_inner()
        })
    }
}
