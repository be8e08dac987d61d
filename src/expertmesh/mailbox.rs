//! Bounded FIFO mailbox owned by a single worker.
//!
//! The bus pushes, the owning worker drains. When the mailbox is full the oldest message is
//! evicted to make room, so a slow worker loses stale traffic rather than blocking publishers.

use crate::expertmesh::message::AgentMessage;
use std::collections::VecDeque;

/// Default capacity used by [`Mailbox::default`].
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1_000;

#[derive(Debug, Clone)]
pub struct Mailbox {
    messages: VecDeque<AgentMessage>,
    capacity: usize,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

impl Mailbox {
    /// Create a mailbox holding at most `capacity` messages. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append `message`, evicting and returning the oldest one if the mailbox was full.
    pub fn push(&mut self, message: AgentMessage) -> Option<AgentMessage> {
        let evicted = if self.messages.len() >= self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            log::debug!("mailbox full, evicting message {}", old.id);
        }
        self.messages.push_back(message);
        evicted
    }

    pub fn pop(&mut self) -> Option<AgentMessage> {
        self.messages.pop_front()
    }

    /// Remove and return every queued message in arrival order.
    pub fn pop_all(&mut self) -> Vec<AgentMessage> {
        self.messages.drain(..).collect()
    }

    pub fn peek(&self) -> Option<&AgentMessage> {
        self.messages.front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expertmesh::client_wrapper::Role;
    use crate::expertmesh::message::{CauseBy, Recipients};

    fn msg(content: &str) -> AgentMessage {
        AgentMessage::new(content, Role::User, CauseBy::DirectCommunication, Recipients::one("w"))
    }

    #[test]
    fn test_full_mailbox_evicts_oldest() {
        let mut mailbox = Mailbox::new(3);
        for content in ["m1", "m2", "m3"] {
            assert!(mailbox.push(msg(content)).is_none());
        }
        let evicted = mailbox.push(msg("m4")).unwrap();
        assert_eq!(evicted.content, "m1");

        let drained: Vec<String> = mailbox.pop_all().into_iter().map(|m| m.content).collect();
        assert_eq!(drained, vec!["m2", "m3", "m4"]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_pop_and_peek_are_fifo() {
        let mut mailbox = Mailbox::default();
        mailbox.push(msg("first"));
        mailbox.push(msg("second"));
        assert_eq!(mailbox.peek().unwrap().content, "first");
        assert_eq!(mailbox.pop().unwrap().content, "first");
        assert_eq!(mailbox.len(), 1);
        assert_eq!(mailbox.capacity(), DEFAULT_MAILBOX_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_still_holds_newest() {
        let mut mailbox = Mailbox::new(0);
        mailbox.push(msg("a"));
        mailbox.push(msg("b"));
        assert_eq!(mailbox.len(), 1);
        assert_eq!(mailbox.peek().unwrap().content, "b");
    }
}
