//! The send pipeline: resolve, payload, pre-send chain, size check,
//! transmit, post-send chain. Every stage must succeed for the next to
//! run.

use tracing::{error, info, trace};

use crate::error::SendError;
use crate::peer::fragment;
use crate::protocol::constants::PART_HEADER_SIZE;
use crate::protocol::Message;

use super::PeerController;

impl PeerController {
    /// Run the full pipeline for one message. `Ok(())` means the
    /// message went out exactly as given; every failure disposition is
    /// a distinct [`SendError`] and has already been logged.
    pub fn send(&mut self, message: Message) -> Result<(), SendError> {
        let mut message = message;
        self.resolve_message(&mut message);
        self.create_payload(&mut message)?;
        let message = self.run_before_send(message)?;
        let message = self.check_payload_size(message)?;

        self.state.udp.send(&message);
        trace!(
            msg_id = message.msg_id(),
            kind = ?message.kind(),
            "sent message"
        );

        self.run_after_send(message)?;
        Ok(())
    }

    /// Stamp identity, clear stale payload, and assign an ID on the
    /// first send attempt.
    pub(crate) fn resolve_message(&mut self, message: &mut Message) {
        message.resolve(&self.config);
        message.prepare_to_send();
        if message.recipient().is_none() {
            if let Some(addr) = self.config.remote_addr {
                message.set_recipient(addr);
            }
        }
        if message.msg_id() == 0 {
            let id = self.state.id_provider.next_id(message);
            message.set_msg_id(id);
            trace!(msg_id = id, kind = ?message.kind(), "message id resolved");
        }
    }

    pub(crate) fn create_payload(&mut self, message: &mut Message) -> Result<(), SendError> {
        if let Err(e) = self.state.udp.create_payload(message) {
            error!(msg_id = message.msg_id(), "payload creation failed: {e}");
            return Err(SendError::Encoding(e));
        }
        Ok(())
    }

    /// Run the pre-send chain phases and the congestion-control slot
    /// between them.
    pub(crate) fn run_before_send(&mut self, message: Message) -> Result<Message, SendError> {
        let message = self
            .state
            .processors
            .before_congestion_control(message)
            .ok_or(SendError::Discarded {
                stage: "before_congestion_control",
            })?;

        if let Some(congestion) = self.state.congestion.as_mut() {
            if !congestion.admit(&message) {
                trace!(msg_id = message.msg_id(), "held back by congestion control");
                return Err(SendError::Discarded {
                    stage: "congestion_control",
                });
            }
        }

        self.state
            .processors
            .before_send(message)
            .ok_or(SendError::Discarded {
                stage: "before_send",
            })
    }

    pub(crate) fn run_after_send(&mut self, message: Message) -> Result<(), SendError> {
        self.state
            .processors
            .after_send(message)
            .map(|_| ())
            .ok_or(SendError::Discarded { stage: "after_send" })
    }

    /// Enforce the datagram cap. An oversize non-part message has its
    /// ID stepped back; with auto-split on its parts are queued, so the
    /// caller learns the original was not sent as-is either way.
    fn check_payload_size(&mut self, message: Message) -> Result<Message, SendError> {
        let size = message.payload().map(|p| p.len()).unwrap_or(0);
        let max = self.config.maximum_udp_packet_size;
        if size <= max || message.is_part() {
            return Ok(message);
        }

        self.state.id_provider.step_back(&message);

        if self.config.auto_split_too_big_messages {
            info!(msg_id = message.msg_id(), size, "auto splitting message");
            let chunk_size = max.saturating_sub(PART_HEADER_SIZE);
            let parts = fragment::split_into_parts(&message, chunk_size);
            if parts.is_empty() {
                error!(
                    msg_id = message.msg_id(),
                    size, max, "oversize message could not be split"
                );
                return Err(SendError::Oversize { size, max });
            }
            let count = parts.len();
            for part in parts {
                self.queue(part);
            }
            return Err(SendError::OversizeSplit { parts: count });
        }

        // The OS may additionally reject a datagram this size.
        error!(
            msg_id = message.msg_id(),
            size, max, "message exceeds maximum_udp_packet_size"
        );
        Err(SendError::Oversize { size, max })
    }
}
