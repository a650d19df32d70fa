//! Puts filtered messages into the message log.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::peer::Processor;
use crate::protocol::{Message, MessageId};

const DEFAULT_LOG_CAPACITY: usize = 4096;

/// Bounded log of sent and received traffic. The sent side keeps only
/// reliable messages and is indexed by ID, which is what a resend
/// lookup needs; the received side is a plain bounded history.
#[derive(Default)]
pub struct MessageLog {
    sent: BTreeMap<MessageId, Message>,
    received: VecDeque<Message>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            sent: BTreeMap::new(),
            received: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn add_sent(&mut self, message: Message) {
        if !message.reliable_mode().is_reliable() {
            return;
        }
        self.sent.insert(message.msg_id(), message);
        // IDs are monotonic per stream, so the smallest is the oldest.
        while self.sent.len() > self.capacity {
            let Some(&oldest) = self.sent.keys().next() else {
                break;
            };
            self.sent.remove(&oldest);
        }
    }

    pub fn add_received(&mut self, message: Message) {
        self.received.push_back(message);
        if self.received.len() > self.capacity {
            self.received.pop_front();
        }
    }

    pub fn sent_by_id(&self, id: MessageId) -> Option<&Message> {
        self.sent.get(&id)
    }

    pub fn sent_len(&self) -> usize {
        self.sent.len()
    }

    pub fn received_len(&self) -> usize {
        self.received.len()
    }
}

/// Sender-post + receiver-pre hook feeding the shared [`MessageLog`].
pub struct MessageLogProcessor {
    log: Arc<Mutex<MessageLog>>,
}

impl MessageLogProcessor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            log: Arc::new(Mutex::new(MessageLog::new(capacity))),
        }
    }

    /// Shared handle for reading the log from outside the chain.
    pub fn log(&self) -> Arc<Mutex<MessageLog>> {
        self.log.clone()
    }
}

impl Default for MessageLogProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for MessageLogProcessor {
    fn name(&self) -> &'static str {
        "message_log"
    }

    fn after_send(&mut self, message: Message) -> Option<Message> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add_sent(message.clone());
        Some(message)
    }

    fn before_receive(&mut self, message: Message) -> Option<Message> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add_received(message.clone());
        Some(message)
    }
}
