//! Splitting oversize encoded payloads into ordered part messages.

use tracing::warn;

use crate::protocol::constants::MAX_MESSAGE_PARTS;
use crate::protocol::{Message, ReliableMode};

/// Split a message whose encoded payload exceeds the datagram cap into
/// ordered parts of at most `chunk_size` payload bytes each.
///
/// Parts inherit the parent's reliability, receiver and recipient; they
/// are fresh messages that get their own IDs when the paced queue
/// releases them. Returns an empty list when the message cannot be
/// fragmented: unreliable parents (losing one part would silently lose
/// the whole message), a missing encoded payload, or a split that would
/// exceed the part-count cap.
pub(crate) fn split_into_parts(message: &Message, chunk_size: usize) -> Vec<Message> {
    if message.reliable_mode() == ReliableMode::Unreliable {
        warn!(
            msg_id = message.msg_id(),
            "refusing to fragment an unreliable message"
        );
        return Vec::new();
    }
    let Some(payload) = message.payload() else {
        warn!(msg_id = message.msg_id(), "no encoded payload to fragment");
        return Vec::new();
    };
    if chunk_size == 0 {
        return Vec::new();
    }

    let count = payload.len().div_ceil(chunk_size);
    if count as u32 > MAX_MESSAGE_PARTS {
        warn!(
            msg_id = message.msg_id(),
            count, "fragment count exceeds the part cap"
        );
        return Vec::new();
    }

    let mut parts = Vec::with_capacity(count);
    for index in 0..count {
        let start = index * chunk_size;
        let end = usize::min(start + chunk_size, payload.len());
        let mut part = Message::part(
            message.msg_id(),
            index as u32,
            count as u32,
            payload.slice(start..end),
            message.reliable_mode(),
        );
        part.set_receiver_id(message.receiver_id());
        if let Some(recipient) = message.recipient() {
            part.set_recipient(recipient);
        }
        parts.push(part);
    }
    parts
}
