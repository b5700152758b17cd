//! Outbound firmware send queue.

use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, PoisonError};

use tracing::info;

use printcom_protocol::EmergencyPolicy;

/// Outbound side of the firmware connection.
pub trait FirmwareLink: Send {
    fn send(&mut self, command: &str) -> io::Result<()>;
}

/// How a command left (or did not leave) the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Transmitted in order.
    Sent,
    /// Held back because the queue is paused.
    Queued,
    /// Transmitted immediately, bypassing queue order and pause state.
    ForceSent,
}

impl DispatchOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Queued => "queued",
            Self::ForceSent => "force-sent",
        }
    }
}

/// FIFO command queue with the emergency bypass.
///
/// Every enqueue consults the force-send predicate first: a hit goes
/// straight to the link, ahead of anything already queued and even while
/// the queue is paused. That is how a prompt answer reaches firmware that
/// is blocking the normal queue on the prompt itself.
pub struct SendQueue {
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    pending: VecDeque<String>,
    paused: bool,
    link: Box<dyn FirmwareLink>,
}

impl QueueInner {
    fn flush(&mut self) -> io::Result<usize> {
        let mut sent = 0;
        while let Some(command) = self.pending.pop_front() {
            if let Err(err) = self.link.send(&command) {
                // transmission failed, keep the command at the head
                self.pending.push_front(command);
                return Err(err);
            }
            sent += 1;
        }
        Ok(sent)
    }
}

impl SendQueue {
    #[must_use]
    pub fn new(link: Box<dyn FirmwareLink>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                paused: false,
                link,
            }),
        }
    }

    /// Queues or transmits one command under the given emergency policy.
    pub fn enqueue(
        &self,
        command: &str,
        policy: &EmergencyPolicy,
    ) -> io::Result<DispatchOutcome> {
        let opcode = command.split_whitespace().next().unwrap_or("");
        let mut inner = self.lock();
        if policy.should_force_send(opcode, command) {
            info!("force-sending {opcode} past the send queue");
            inner.link.send(command)?;
            return Ok(DispatchOutcome::ForceSent);
        }
        if inner.paused {
            inner.pending.push_back(command.to_string());
            return Ok(DispatchOutcome::Queued);
        }
        // drain any backlog first so FIFO order holds
        inner.flush()?;
        inner.link.send(command)?;
        Ok(DispatchOutcome::Sent)
    }

    pub fn pause(&self) {
        self.lock().paused = true;
    }

    /// Unpauses and drains the backlog; returns how many held commands went
    /// out.
    pub fn resume(&self) -> io::Result<usize> {
        let mut inner = self.lock();
        inner.paused = false;
        inner.flush()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
