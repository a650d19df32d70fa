//! Receive-side reassembly of fragmented messages.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::error::DecodeError;
use crate::protocol::constants::{MAX_CONCURRENT_PART_GROUPS, MAX_MESSAGE_PARTS};
use crate::protocol::{ClientId, Message, MessageBody, MessageId};

struct PartGroup {
    parts: Vec<Option<Bytes>>,
    received: usize,
    last_update_ms: i64,
}

/// Buffers incoming part messages per (sender, parent) group and yields
/// the parent's encoded bytes once every part has arrived. Incomplete
/// groups are pruned after a TTL so a half-delivered oversize message
/// cannot pin memory forever.
pub struct PartAssembler {
    groups: HashMap<(ClientId, MessageId), PartGroup>,
    ttl_ms: i64,
}

impl PartAssembler {
    pub fn new(ttl_ms: i64) -> Self {
        let ttl_ms = if ttl_ms <= 0 { 30_000 } else { ttl_ms };
        Self {
            groups: HashMap::new(),
            ttl_ms,
        }
    }

    /// Feed one part. Returns the reassembled parent bytes when this
    /// part completed its group.
    pub fn add(&mut self, message: &Message, now_ms: i64) -> Result<Option<Bytes>, DecodeError> {
        let MessageBody::Part {
            parent_id,
            index,
            count,
            bytes,
        } = message.body()
        else {
            return Ok(None);
        };

        if *count == 0 || *count > MAX_MESSAGE_PARTS {
            return Err(DecodeError::PartCountTooLarge(*count));
        }

        let key = (message.sender_id(), *parent_id);
        if self.groups.len() >= MAX_CONCURRENT_PART_GROUPS && !self.groups.contains_key(&key) {
            return Err(DecodeError::PartBufferFull);
        }

        let group = self.groups.entry(key).or_insert_with(|| PartGroup {
            parts: vec![None; *count as usize],
            received: 0,
            last_update_ms: now_ms,
        });

        if group.parts.len() != *count as usize {
            return Err(DecodeError::PartCountMismatch);
        }
        let idx = *index as usize;
        if idx >= group.parts.len() {
            return Err(DecodeError::PartIndexOutOfRange);
        }
        if group.parts[idx].is_some() {
            // Duplicate part, just ignore it. Resend-happy senders
            // retransmit parts that were already consumed.
            warn!(
                parent_id,
                index, count, "duplicate part ignored"
            );
            return Ok(None);
        }

        group.parts[idx] = Some(bytes.clone());
        group.received += 1;
        group.last_update_ms = now_ms;

        if group.received != group.parts.len() {
            return Ok(None);
        }

        let mut buf = BytesMut::new();
        for part in &group.parts {
            let part = part.as_ref().ok_or(DecodeError::PartCountMismatch)?;
            buf.extend_from_slice(part);
        }
        self.groups.remove(&key);
        Ok(Some(buf.freeze()))
    }

    /// Drop groups that have not seen a part within the TTL. Returns
    /// how many groups were discarded.
    pub fn prune(&mut self, now_ms: i64) -> usize {
        let ttl = self.ttl_ms;
        let before = self.groups.len();
        self.groups.retain(|(sender, parent), group| {
            let fresh = now_ms - group.last_update_ms < ttl;
            if !fresh {
                warn!(
                    sender,
                    parent,
                    age_ms = now_ms - group.last_update_ms,
                    "dropping expired part group"
                );
            }
            fresh
        });
        before - self.groups.len()
    }
}
