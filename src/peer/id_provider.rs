//! Monotonic per-stream message ID assignment.

use std::collections::HashMap;

use crate::protocol::{ClientId, Message, MessageId, ReliableMode};

/// Assigns per-stream monotonic message IDs.
///
/// The provider lives on the processing thread; nothing else may call
/// it, which is what makes `step_back` exact: if `next_id` would have
/// issued `n`, then after a `step_back` the next call issues `n` again.
pub trait IdProvider: Send {
    /// Issue the next ID for the stream this message belongs to.
    fn next_id(&mut self, message: &Message) -> MessageId;

    /// Return the most recently issued ID of the message's stream to
    /// the pool (used when fragmentation replaces a message with its
    /// parts, so no ID leaks).
    fn step_back(&mut self, message: &Message);

    /// Whether a server broadcast must assign a fresh ID per recipient
    /// (per-client streams) instead of one shared ID for the whole
    /// fan-out.
    fn resolve_every_client_message(&self) -> bool;
}

/// One ID stream per reliability mode, shared across all recipients.
/// Broadcasts carry the same ID to every client.
#[derive(Default)]
pub struct ReliableModeIdProvider {
    last_issued: HashMap<ReliableMode, MessageId>,
}

impl ReliableModeIdProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdProvider for ReliableModeIdProvider {
    fn next_id(&mut self, message: &Message) -> MessageId {
        let last = self.last_issued.entry(message.reliable_mode()).or_insert(0);
        *last += 1;
        *last
    }

    fn step_back(&mut self, message: &Message) {
        if let Some(last) = self.last_issued.get_mut(&message.reliable_mode()) {
            *last = last.saturating_sub(1);
        }
    }

    fn resolve_every_client_message(&self) -> bool {
        false
    }
}

/// One ID stream per (recipient, reliability mode) pair. Every client
/// sees a dense ID sequence of its own, so broadcasts re-resolve the
/// ID for each recipient.
#[derive(Default)]
pub struct PerClientIdProvider {
    last_issued: HashMap<(ClientId, ReliableMode), MessageId>,
}

impl PerClientIdProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdProvider for PerClientIdProvider {
    fn next_id(&mut self, message: &Message) -> MessageId {
        let key = (message.receiver_id(), message.reliable_mode());
        let last = self.last_issued.entry(key).or_insert(0);
        *last += 1;
        *last
    }

    fn step_back(&mut self, message: &Message) {
        let key = (message.receiver_id(), message.reliable_mode());
        if let Some(last) = self.last_issued.get_mut(&key) {
            *last = last.saturating_sub(1);
        }
    }

    fn resolve_every_client_message(&self) -> bool {
        true
    }
}
