//! The queue between the control side and one server's worker thread.
//!
//! Any thread may `send`; only the owning worker calls `recv`. Commands are
//! handed out strictly in the order they were sent. `send` never waits for the
//! worker, `recv` blocks on a condition variable while the queue is empty.

use crate::lock_ext::{CondvarExt, MutexExt};

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Command {
    Stop,
    Restart,
    Backup,
    /// A line for the server's console, written to its stdin as is
    Input(String),
    /// Posted by the waiter thread when the child with this pid was reaped
    ChildExited(u32),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct MailboxClosed;

impl std::fmt::Display for MailboxClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("the worker is no longer accepting commands")
    }
}

impl std::error::Error for MailboxClosed {}

#[derive(Default, Debug)]
struct Queue {
    commands: VecDeque<Command>,
    closed: bool,
}

#[derive(Default, Debug)]
pub struct Mailbox {
    queue: Mutex<Queue>,
    ready: Condvar,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, cmd: Command) -> Result<(), MailboxClosed> {
        {
            let mut queue = self.queue.lock_poisoned();
            if queue.closed {
                return Err(MailboxClosed);
            }
            queue.commands.push_back(cmd);
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Block until a command is available. Returns `None` once the mailbox is
    /// closed and everything sent before the close was handed out.
    pub fn recv(&self) -> Option<Command> {
        let mut queue = self.queue.lock_poisoned();
        loop {
            if let Some(cmd) = queue.commands.pop_front() {
                return Some(cmd);
            }
            if queue.closed {
                return None;
            }
            queue = self.ready.wait_poisoned(queue);
        }
    }

    /// Refuse further commands and drop whatever is still queued. Returns the
    /// dropped commands so the caller can log them.
    pub fn close(&self) -> Vec<Command> {
        let dropped = {
            let mut queue = self.queue.lock_poisoned();
            queue.closed = true;
            queue.commands.drain(..).collect()
        };
        self.ready.notify_all();
        dropped
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.queue.lock_poisoned().closed
    }

    pub fn len(&self) -> usize {
        self.queue.lock_poisoned().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
