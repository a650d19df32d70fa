//! Fan-out send paths: per-client IDs or one shared ID per broadcast,
//! selected by the ID provider.

use tracing::{trace, warn};

use crate::error::SendError;
use crate::protocol::{ClientId, Message};

use super::Server;

impl Server {
    /// Server-side send. A concrete `receiver_id` goes straight to that
    /// client; `receiver_id == 0` fans out to everyone.
    pub fn send(&mut self, message: Message) -> Result<(), SendError> {
        self.fan_out(message, 0)
    }

    /// Send to a single registered client.
    pub fn send_to(&mut self, client_id: ClientId, mut message: Message) -> Result<(), SendError> {
        let Some(addr) = self.registry().address_of(client_id) else {
            warn!(client_id, "client not found");
            return Err(SendError::UnknownReceiver(client_id));
        };
        message.set_receiver_id(client_id);
        message.set_recipient(addr);
        self.peer_mut().send(message)
    }

    pub(crate) fn fan_out(
        &mut self,
        message: Message,
        except_id: ClientId,
    ) -> Result<(), SendError> {
        if message.receiver_id() > 0 {
            let receiver = message.receiver_id();
            return self.send_to(receiver, message);
        }

        if self.peer().state().id_provider.resolve_every_client_message() {
            self.fan_out_per_client(message, except_id)
        } else {
            self.fan_out_shared(message, except_id)
        }
    }

    /// Per-client-ID mode: each recipient gets its own ID, payload and
    /// pre/post chain run.
    fn fan_out_per_client(
        &mut self,
        mut message: Message,
        except_id: ClientId,
    ) -> Result<(), SendError> {
        message.resolve(self.peer().config());
        message.prepare_to_send();

        if !message.is_resend() {
            self.count_outgoing(message.kind());
        }

        let clients = self.registry().snapshot();
        let mut failed_stage = None;
        let mut sent_any = false;

        for (client_id, addr) in clients {
            if except_id > 0 && except_id == client_id {
                continue;
            }
            message.set_receiver_id(client_id);
            let id = self.peer_mut().state_mut().id_provider.next_id(&message);
            message.set_msg_id(id);
            message.set_recipient(addr);
            if self.peer_mut().create_payload(&mut message).is_err() {
                failed_stage = Some("create_payload");
                continue;
            }

            let per_client = match self.peer_mut().run_before_send(message.clone()) {
                Ok(m) => m,
                Err(_) => {
                    failed_stage = Some("before_send");
                    continue;
                }
            };
            self.peer_mut().state_mut().udp.send(&per_client);
            sent_any = true;
            if self.peer_mut().run_after_send(per_client).is_err() {
                failed_stage = Some("after_send");
            }
        }
        trace!(msg_id = message.msg_id(), "fanned out message");

        if sent_any {
            self.reset_keep_alive();
        }
        match failed_stage {
            Some(stage) => Err(SendError::Discarded { stage }),
            None => Ok(()),
        }
    }

    /// Shared-ID mode: one resolve, one pre-send run, one payload; only
    /// the recipient address changes per client.
    fn fan_out_shared(
        &mut self,
        mut message: Message,
        except_id: ClientId,
    ) -> Result<(), SendError> {
        self.peer_mut().resolve_message(&mut message);

        let mut message = self.peer_mut().run_before_send(message)?;

        if !message.is_resend() {
            self.count_outgoing(message.kind());
        }

        self.peer_mut().create_payload(&mut message)?;

        let mut sent_any = false;
        for (client_id, addr) in self.registry().snapshot() {
            if except_id > 0 && except_id == client_id {
                continue;
            }
            message.set_receiver_id(client_id);
            message.set_recipient(addr);
            self.peer_mut().state_mut().udp.send(&message);
            sent_any = true;
        }
        trace!(msg_id = message.msg_id(), "fanned out message");

        message.set_receiver_id(0);
        self.peer_mut().run_after_send(message)?;

        if sent_any {
            self.reset_keep_alive();
        }
        Ok(())
    }

    /// A broadcast that went out makes a separate heartbeat pointless
    /// for one interval.
    fn reset_keep_alive(&mut self) {
        self.last_keep_alive_ms = self.peer().state().clock.now_millis();
    }
}
