//! Receive-side dedup and ordering filter for sequenced messages.

use std::collections::HashMap;

use tracing::trace;

use crate::peer::Processor;
use crate::protocol::{ClientId, Message, MessageId, ReliableMode};

/// Drops duplicate and stale `SequenceNumber` messages per sender
/// stream. IDs are monotonic, so anything at or below the last
/// delivered ID has already been seen; gaps are tolerated (a skipped
/// message is simply lost, which is this mode's contract).
#[derive(Default)]
pub struct SequenceProcessor {
    last_delivered: HashMap<ClientId, MessageId>,
}

impl SequenceProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for SequenceProcessor {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn before_receive(&mut self, message: Message) -> Option<Message> {
        if message.reliable_mode() != ReliableMode::SequenceNumber {
            return Some(message);
        }

        let last = self
            .last_delivered
            .get(&message.sender_id())
            .copied()
            .unwrap_or(0);
        if message.msg_id() <= last {
            trace!(
                msg_id = message.msg_id(),
                sender = message.sender_id(),
                last,
                "stale sequenced message dropped"
            );
            return None;
        }

        self.last_delivered.insert(message.sender_id(), message.msg_id());
        Some(message)
    }
}
