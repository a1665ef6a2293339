//! Cross-CPU scheduling requests
//!
//! A CPU never mutates another CPU's ready queue. Instead it posts a
//! [`Request`] into the target's mailbox and sends it an IPI; the target
//! drains its mailbox from the IPI handler and performs each request
//! locally with interrupts masked.

extern crate alloc;

use alloc::collections::VecDeque;

use spin::Mutex;

use super::context::ScId;
use super::error::SchedError;

/// IPI payloads the scheduler sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpiMessage {
    /// The mailbox has work or the ready queue needs re-evaluation.
    Reschedule,
    /// The set of online CPUs changed.
    Hotplug,
}

/// Work posted to a remote CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    /// Make a context bound to the target CPU runnable.
    Wake(ScId),
    /// Remove a context bound to the target CPU from its ready queue.
    Block(ScId),
}

/// Bounded request queue of one CPU.
pub struct Mailbox {
    queue: Mutex<VecDeque<Request>>,
    depth: usize,
}

impl Mailbox {
    pub fn new(depth: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(depth)),
            depth,
        }
    }

    /// Queue a request. Fails instead of growing past the configured depth.
    pub fn post(&self, request: Request) -> Result<(), SchedError> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.depth {
            return Err(SchedError::MailboxFull);
        }
        queue.push_back(request);
        Ok(())
    }

    /// Take the oldest pending request.
    ///
    /// The lock is only held for the pop, never while the request runs.
    pub fn pop(&self) -> Option<Request> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
