//! The periodic `process()` tick: pacing, processor upkeep, transport
//! drain.

use tracing::debug;

use crate::protocol::Message;

use super::PeerController;

impl PeerController {
    /// One cooperative tick. The host calls this periodically; pacing
    /// resolution is bounded by how often it does.
    pub fn process(&mut self) {
        let now = self.tick_clock();
        if let Some(message) = self.pop_due_queued() {
            if let Err(e) = self.send(message) {
                debug!("queued message not sent: {e}");
            }
        }
        self.run_periodic(now);
        for message in self.transport_tick() {
            self.receive(message);
        }
    }

    /// Advance the pacing accumulator by the time elapsed since the
    /// previous tick.
    pub(crate) fn tick_clock(&mut self) -> i64 {
        let now = self.state.clock.now_millis();
        self.queue_delay_inc += now - self.last_tick_ms;
        self.last_tick_ms = now;
        now
    }

    /// Release at most one queued message per eligible tick, strictly
    /// FIFO. The accumulator resets only when something was released.
    pub(crate) fn pop_due_queued(&mut self) -> Option<Message> {
        if self.queue_delay_inc > self.config.queued_messages_delay {
            if let Some(message) = self.queued.pop_front() {
                self.queue_delay_inc = 0;
                return Some(message);
            }
        }
        None
    }

    /// Drive processor upkeep (queueing whatever they emit) and prune
    /// stale reassembly state.
    pub(crate) fn run_periodic(&mut self, now_ms: i64) {
        let emitted = self.state.processors.run_processables(now_ms);
        for message in emitted {
            self.queue(message);
        }
        self.prune_assembler(now_ms);
    }

    /// Drive transport I/O and drain delivered messages.
    pub(crate) fn transport_tick(&mut self) -> Vec<Message> {
        self.state.udp.process()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::peer::PeerController;
    use crate::protocol::{Message, ReliableMode};
    use crate::test_util::recording_state;
    use bytes::Bytes;

    fn queued_message(tag: u8) -> Message {
        let mut m = Message::app(Bytes::from(vec![tag]), ReliableMode::Unreliable);
        m.set_recipient("127.0.0.1:9000".parse().unwrap());
        m
    }

    #[test]
    fn releases_at_most_one_message_per_eligible_tick() {
        let config = Config::builder().queued_messages_delay(100).build();
        let (state, handle) = recording_state();
        let mut peer = PeerController::new(config, state);

        for tag in 1..=3 {
            peer.queue(queued_message(tag));
        }

        // Not enough accumulated time: nothing released.
        handle.clock.advance(50);
        peer.process();
        assert_eq!(handle.sent_len(), 0);

        // Past the delay: exactly one.
        handle.clock.advance(60);
        peer.process();
        assert_eq!(handle.sent_len(), 1);

        // The accumulator was reset; the next message needs its own gap.
        handle.clock.advance(10);
        peer.process();
        assert_eq!(handle.sent_len(), 1);

        handle.clock.advance(101);
        peer.process();
        assert_eq!(handle.sent_len(), 2);
    }

    #[test]
    fn queue_is_drained_in_fifo_order() {
        let config = Config::builder().queued_messages_delay(10).build();
        let (state, handle) = recording_state();
        let mut peer = PeerController::new(config, state);

        for tag in 1..=4 {
            peer.queue(queued_message(tag));
        }
        for _ in 0..4 {
            handle.clock.advance(11);
            peer.process();
        }

        let tags: Vec<u8> = handle
            .sent()
            .iter()
            .map(|m| match m.body() {
                crate::protocol::MessageBody::App(bytes) => bytes[0],
                _ => panic!("expected app bodies"),
            })
            .collect();
        assert_eq!(tags, vec![1, 2, 3, 4]);
    }

    #[test]
    fn delivered_messages_run_through_the_receive_pipeline() {
        let (state, handle) = recording_state();
        let mut peer = PeerController::new(Config::default(), state);

        let mut inbound = Message::app(Bytes::from_static(b"in"), ReliableMode::Unreliable);
        inbound.set_msg_id(3);
        handle.push_inbound(inbound);

        peer.process();
        let received = handle.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].msg_id(), 3);
    }

    #[test]
    fn stop_discards_queued_messages_and_says_goodbye() {
        let (state, handle) = recording_state();
        let mut peer = PeerController::new(Config::default(), state);
        assert!(peer.start());

        peer.queue(queued_message(1));
        peer.stop();

        assert_eq!(peer.queued_len(), 0);
        assert!(!peer.is_connected());
        let sent = handle.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), crate::protocol::MessageKind::LeaveRequest);
    }
}
