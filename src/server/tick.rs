//! The server's periodic tick: paced queue release through the fan-out
//! path, keep-alive pulse, and liveness eviction.

use tracing::debug;

use crate::protocol::Message;

use super::{Server, UnregisterReason};

impl Server {
    /// One cooperative tick. Mirrors the peer tick but routes queued
    /// releases and received messages through the server-side policies,
    /// then handles the heartbeat and client timeouts.
    pub fn process(&mut self) {
        let now = self.peer_mut().tick_clock();

        if let Some(message) = self.peer_mut().pop_due_queued() {
            if let Err(e) = self.send(message) {
                debug!("queued message not sent: {e}");
            }
        }

        self.peer_mut().run_periodic(now);

        for message in self.peer_mut().transport_tick() {
            self.receive(message);
        }

        self.pulse_keep_alive(now);
        self.evict_timed_out(now);
    }

    /// Keep idle reliable ID streams advancing while anyone is
    /// listening. Any broadcast that went out already reset the timer.
    fn pulse_keep_alive(&mut self, now_ms: i64) {
        if self.registry().is_empty() {
            return;
        }
        if self.last_keep_alive_ms + self.config().keep_alive_interval < now_ms {
            self.last_keep_alive_ms = now_ms;
            if let Err(e) = self.send(Message::keep_alive()) {
                debug!("keep-alive not sent: {e}");
            }
        }
    }

    /// Passive liveness: drop every client whose last traffic is older
    /// than the threshold.
    fn evict_timed_out(&mut self, now_ms: i64) {
        let threshold = self.config().timeout_threshold;
        for client_id in self.registry().timed_out(now_ms, threshold) {
            self.unregister(client_id, UnregisterReason::TimedOut);
        }
    }
}
