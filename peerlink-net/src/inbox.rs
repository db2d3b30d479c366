//! Shared inbox: handlers append, callers wait for the first message matching an event.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use peerlink_core::{Message, MessageQueue};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Received messages in arrival order.
/// The lock is held only while pushing or scanning, never across a wait.
#[derive(Debug, Default)]
pub struct Inbox {
    queue: Mutex<MessageQueue>,
    appended: Notify,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and wake every waiting receiver.
    pub fn append(&self, msg: Message) {
        self.lock().push(msg);
        self.appended.notify_waiters();
    }

    /// Remove and return the first message whose event equals `filter` (any if `None`).
    /// Waits for appends until `timeout` elapses; returns `None` on timeout.
    /// A timeout too large to represent as an instant waits without a deadline.
    pub async fn pop_matching(&self, filter: Option<&str>, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            // Register before scanning so an append between scan and wait is not missed.
            let appended = self.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(msg) = self.try_pop(filter) {
                return Some(msg);
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, appended).await.is_err() {
                        return None;
                    }
                }
                None => appended.await,
            }
        }
    }

    /// Non-blocking variant of [`Inbox::pop_matching`].
    pub fn try_pop(&self, filter: Option<&str>) -> Option<Message> {
        self.lock().take_first(filter)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take everything not yet received, oldest first.
    pub fn drain(&self) -> Vec<Message> {
        self.lock().drain()
    }

    pub fn clear(&self) {
        self.lock().drain();
    }

    fn lock(&self) -> MutexGuard<'_, MessageQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
