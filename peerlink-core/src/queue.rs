//! Ordered queue of received messages with event-filtered removal.
//! Unsynchronized; the host wraps it in a lock (see peerlink-net inbox).

use std::collections::VecDeque;

use crate::protocol::Message;

/// Messages in arrival order.
#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: VecDeque<Message>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push_back(msg);
    }

    /// Remove and return the first message matching `filter` (any message if `None`).
    /// Relative order of the remaining messages is unchanged.
    pub fn take_first(&mut self, filter: Option<&str>) -> Option<Message> {
        let idx = self.messages.iter().position(|m| m.matches(filter))?;
        self.messages.remove(idx)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Take every pending message, oldest first.
    pub fn drain(&mut self) -> Vec<Message> {
        self.messages.drain(..).collect()
    }
}
