//! Ack-based retransmission: tracks in-flight reliable messages on the
//! sender, batches acknowledgements on the receiver, and resends on an
//! interval until acked or exhausted.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, error, trace};

use crate::config::Config;
use crate::peer::Processor;
use crate::protocol::{ClientId, Message, MessageBody, MessageId, ReliableMode};

/// Seen-ID window kept per sender for duplicate suppression. Old
/// entries below the window floor are forgotten; their IDs can never
/// come back on a monotonic stream.
const SEEN_WINDOW: usize = 1024;

struct Pending {
    message: Message,
    last_sent_ms: i64,
    resends: u32,
}

#[derive(Default)]
struct SeenIds {
    ids: BTreeSet<MessageId>,
}

impl SeenIds {
    /// Returns true if this ID was already recorded.
    fn record(&mut self, id: MessageId) -> bool {
        if !self.ids.insert(id) {
            return true;
        }
        while self.ids.len() > SEEN_WINDOW {
            let Some(&floor) = self.ids.iter().next() else {
                break;
            };
            self.ids.remove(&floor);
        }
        false
    }
}

/// Retransmit-until-acked for `AckPacket` messages.
///
/// Sender side (`after_send`): every first transmission of a reliable
/// message is tracked per (receiver, ID). Receiver side
/// (`before_receive`): reliable messages are queued for a batched ack
/// and duplicates are discarded; incoming ack batches release tracked
/// entries. The periodic hook flushes ack batches and emits resends; a
/// message that stays unacked through `max_resends` attempts is dropped
/// and surfaced through [`take_exhausted`](Self::take_exhausted).
pub struct ReliableAckProcessor {
    resend_interval: i64,
    max_resends: u32,
    pending: HashMap<(ClientId, MessageId), Pending>,
    ack_outbox: HashMap<ClientId, BTreeSet<MessageId>>,
    seen: HashMap<ClientId, SeenIds>,
    exhausted: Vec<Message>,
    now_ms: i64,
}

impl ReliableAckProcessor {
    pub fn new(resend_interval: i64, max_resends: u32) -> Self {
        Self {
            resend_interval: resend_interval.max(1),
            max_resends,
            pending: HashMap::new(),
            ack_outbox: HashMap::new(),
            seen: HashMap::new(),
            exhausted: Vec::new(),
            now_ms: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.resend_interval, config.max_resends)
    }

    /// Messages whose retries ran out since the last call.
    pub fn take_exhausted(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.exhausted)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn release(&mut self, acker: ClientId, id: MessageId) {
        // Direct sends are tracked under their receiver; a shared-ID
        // broadcast is tracked under receiver 0 and released by the
        // first acknowledging client.
        if self.pending.remove(&(acker, id)).is_none() {
            self.pending.remove(&(0, id));
        }
    }
}

impl Processor for ReliableAckProcessor {
    fn name(&self) -> &'static str {
        "reliable_ack"
    }

    fn after_send(&mut self, message: Message) -> Option<Message> {
        if message.reliable_mode() == ReliableMode::AckPacket && !message.is_resend() {
            trace!(
                msg_id = message.msg_id(),
                receiver = message.receiver_id(),
                "tracking reliable message"
            );
            self.pending.insert(
                (message.receiver_id(), message.msg_id()),
                Pending {
                    message: message.clone(),
                    last_sent_ms: self.now_ms,
                    resends: 0,
                },
            );
        }
        Some(message)
    }

    fn before_receive(&mut self, message: Message) -> Option<Message> {
        if let MessageBody::Ack { ids } = message.body() {
            for id in ids.clone() {
                self.release(message.sender_id(), id);
            }
            return Some(message);
        }

        if message.reliable_mode() == ReliableMode::AckPacket {
            // Always re-ack: the previous ack may have been lost.
            self.ack_outbox
                .entry(message.sender_id())
                .or_default()
                .insert(message.msg_id());

            let seen = self.seen.entry(message.sender_id()).or_default();
            if seen.record(message.msg_id()) {
                trace!(
                    msg_id = message.msg_id(),
                    sender = message.sender_id(),
                    "duplicate reliable message dropped"
                );
                return None;
            }
        }
        Some(message)
    }

    fn process(&mut self, now_millis: i64) -> Vec<Message> {
        self.now_ms = now_millis;
        let mut out = Vec::new();

        for (peer_id, ids) in std::mem::take(&mut self.ack_outbox) {
            let mut ack = Message::ack(ids);
            ack.set_receiver_id(peer_id);
            out.push(ack);
        }

        let mut exhausted_keys = Vec::new();
        for (key, entry) in self.pending.iter_mut() {
            if now_millis - entry.last_sent_ms < self.resend_interval {
                continue;
            }
            if entry.resends >= self.max_resends {
                error!(
                    msg_id = key.1,
                    receiver = key.0,
                    resends = entry.resends,
                    "reliable message exhausted its retries"
                );
                exhausted_keys.push(*key);
                continue;
            }
            entry.resends += 1;
            entry.last_sent_ms = now_millis;
            let mut resend = entry.message.clone();
            resend.mark_resend();
            debug!(
                msg_id = key.1,
                attempt = entry.resends,
                "resending unacked message"
            );
            out.push(resend);
        }
        for key in exhausted_keys {
            if let Some(entry) = self.pending.remove(&key) {
                self.exhausted.push(entry.message);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn reliable(id: MessageId, receiver: ClientId) -> Message {
        let mut m = Message::app(Bytes::from_static(b"x"), ReliableMode::AckPacket);
        m.set_msg_id(id);
        m.set_receiver_id(receiver);
        m
    }

    fn ack_from(sender: ClientId, ids: &[MessageId]) -> Message {
        let mut m = Message::ack(ids.iter().copied().collect());
        m.set_sender_id(sender);
        m
    }

    #[test]
    fn tracks_until_acked() {
        let mut p = ReliableAckProcessor::new(100, 3);
        p.after_send(reliable(1, 7));
        assert_eq!(p.pending_len(), 1);

        p.before_receive(ack_from(7, &[1]));
        assert_eq!(p.pending_len(), 0);
    }

    #[test]
    fn resends_on_interval_and_marks_resend() {
        let mut p = ReliableAckProcessor::new(100, 3);
        p.after_send(reliable(1, 7));

        assert!(p.process(50).is_empty());
        let out = p.process(150);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_resend());
        assert_eq!(out[0].msg_id(), 1);

        // Resent messages flowing back through after_send are not
        // re-tracked as fresh.
        p.after_send(out[0].clone());
        assert_eq!(p.pending_len(), 1);
    }

    #[test]
    fn exhausts_after_max_resends() {
        let mut p = ReliableAckProcessor::new(100, 2);
        p.after_send(reliable(1, 7));

        let mut now = 0;
        let mut resends = 0;
        for _ in 0..6 {
            now += 150;
            resends += p.process(now).len();
        }
        assert_eq!(resends, 2);
        assert_eq!(p.pending_len(), 0);

        let exhausted = p.take_exhausted();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(exhausted[0].msg_id(), 1);
        assert!(p.take_exhausted().is_empty());
    }

    #[test]
    fn receiver_batches_acks_per_peer() {
        let mut p = ReliableAckProcessor::new(100, 3);

        let mut from_a = reliable(1, 0);
        from_a.set_sender_id(5);
        let mut from_a2 = reliable(2, 0);
        from_a2.set_sender_id(5);
        let mut from_b = reliable(1, 0);
        from_b.set_sender_id(6);

        assert!(p.before_receive(from_a).is_some());
        assert!(p.before_receive(from_a2).is_some());
        assert!(p.before_receive(from_b).is_some());

        let out = p.process(10);
        assert_eq!(out.len(), 2);
        for ack in &out {
            let MessageBody::Ack { ids } = ack.body() else {
                panic!("expected ack bodies");
            };
            match ack.receiver_id() {
                5 => assert_eq!(ids.len(), 2),
                6 => assert_eq!(ids.len(), 1),
                other => panic!("unexpected ack receiver {other}"),
            }
        }
    }

    #[test]
    fn duplicate_reliable_delivery_is_dropped_but_reacked() {
        let mut p = ReliableAckProcessor::new(100, 3);
        let mut m = reliable(4, 0);
        m.set_sender_id(5);

        assert!(p.before_receive(m.clone()).is_some());
        let _ = p.process(10);

        // The retransmit arrives after the ack was lost.
        assert!(p.before_receive(m).is_none());
        let out = p.process(20);
        assert_eq!(out.len(), 1);
        let MessageBody::Ack { ids } = out[0].body() else {
            panic!("expected an ack");
        };
        assert!(ids.contains(&4));
    }

    #[test]
    fn integrates_with_the_peer_tick_for_resend_and_release() {
        use crate::peer::{shared, PeerController, ProcessorChain};
        use crate::test_util::recording_state;

        let (state, handle) = recording_state();
        let mut chain = ProcessorChain::new();
        let ack = shared(ReliableAckProcessor::new(100, 3));
        chain.add_sender_post(ack.clone());
        chain.add_receiver_pre(ack);
        let state = state.with_processors(chain);
        let config = Config::builder().queued_messages_delay(0).build();
        let mut peer = PeerController::new(config, state);

        let mut m = Message::app(Bytes::from_static(b"x"), ReliableMode::AckPacket);
        m.set_recipient("127.0.0.1:9000".parse().unwrap());
        peer.send(m).unwrap();
        assert_eq!(handle.sent_len(), 1);

        // The interval elapses; the periodic hook queues the resend and
        // the next tick releases it.
        handle.clock.set(150);
        peer.process();
        handle.clock.set(151);
        peer.process();
        let sent = handle.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].is_resend());
        assert_eq!(sent[1].msg_id(), sent[0].msg_id());

        // An ack from the far side releases the entry; nothing further
        // is retransmitted.
        let mut ack_reply = Message::ack([sent[0].msg_id()].into_iter().collect());
        ack_reply.set_sender_id(0);
        handle.push_inbound(ack_reply);
        handle.clock.set(200);
        peer.process();
        handle.clock.set(600);
        peer.process();
        handle.clock.set(601);
        peer.process();
        assert_eq!(handle.sent_len(), 2);
    }

    #[test]
    fn shared_broadcast_entry_released_by_first_acker() {
        let mut p = ReliableAckProcessor::new(100, 3);
        // Shared-ID broadcasts run after_send with receiver cleared.
        p.after_send(reliable(9, 0));
        assert_eq!(p.pending_len(), 1);

        p.before_receive(ack_from(3, &[9]));
        assert_eq!(p.pending_len(), 0);
    }
}
