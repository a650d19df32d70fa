//! The receive pipeline: feature resolution, pre-receive chain,
//! instant-vs-external dispatch, post-receive chain.

use tracing::{trace, warn};

use crate::protocol::{Message, MessageKind};

use super::PeerController;

impl PeerController {
    /// Run the receive pipeline for one delivered message to
    /// completion before the next is processed.
    pub fn receive(&mut self, mut message: Message) {
        message.features_mut().resolve();

        let Some(message) = self.state.processors.before_receive(message) else {
            return;
        };

        trace!(
            msg_id = message.msg_id(),
            kind = ?message.kind(),
            "received message"
        );

        self.dispatch(&message);

        let _ = self.state.processors.after_receive(message);
    }

    /// Protocol-level kinds are handled here, synchronously, so acks,
    /// fragments and heartbeats never take the detour through queued
    /// application delivery. Everything else goes to the external
    /// receiver.
    fn dispatch(&mut self, message: &Message) {
        match message.kind() {
            MessageKind::App => self.state.receiver.receive(message.clone()),
            MessageKind::Part => self.handle_part(message),
            // Acks are consumed by the ack processor in the pre-chain;
            // a keep-alive exists only to advance its ID stream; the
            // connect/leave kinds are server business and a plain peer
            // ignores them.
            MessageKind::Ack
            | MessageKind::KeepAlive
            | MessageKind::ConnectRequest
            | MessageKind::LeaveRequest => {}
        }
    }

    /// Feed one fragment into the assembler; a completed group decodes
    /// back into the parent message, which re-enters the pipeline.
    fn handle_part(&mut self, message: &Message) {
        let now = self.state.clock.now_millis();
        match self.assembler.add(message, now) {
            Ok(Some(bytes)) => match self.state.udp.decode_payload(bytes) {
                Ok(mut parent) => {
                    if let Some(addr) = message.sender_addr() {
                        parent.set_sender_addr(addr);
                    }
                    self.receive(parent);
                }
                Err(e) => {
                    warn!(msg_id = message.msg_id(), "reassembled message undecodable: {e}");
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(msg_id = message.msg_id(), "part rejected: {e}");
            }
        }
    }

    pub(crate) fn prune_assembler(&mut self, now_ms: i64) {
        self.assembler.prune(now_ms);
    }
}
