//! Server multiplexer: client registry, liveness, broadcast fan-out,
//! and the receive-side policies that go with them. Per-area logic
//! lives in submodules (broadcast, tick).

mod broadcast;
mod registry;
mod tick;

pub use registry::ClientRegistry;

use std::collections::HashMap;

use tracing::{info, warn};

use crate::config::{Config, State};
use crate::peer::PeerController;
use crate::protocol::{ClientId, Message, MessageBody, MessageKind};

/// Registry lifecycle callbacks.
pub trait ServerHooks: Send {
    fn on_register(&mut self, _client_id: ClientId) {}
    fn on_unregister(&mut self, _client_id: ClientId) {}
}

/// Default hook that does nothing.
pub struct NoopServerHooks;

impl ServerHooks for NoopServerHooks {}

/// Why a client left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnregisterReason {
    /// A leave request was received.
    Left,
    /// Silence outlasted the timeout threshold.
    TimedOut,
    /// A repeat connect request replaced the old registration.
    Rejoin,
    /// Host code asked for the removal.
    Explicit,
}

/// A peer that tracks clients and fans messages out to them.
///
/// Wraps a [`PeerController`] rather than being one: the controller's
/// pipeline stages are reused, but the send and receive entry points
/// here add registry policy on top.
pub struct Server {
    peer: PeerController,
    registry: ClientRegistry,
    required_clients: HashMap<ClientId, bool>,
    incoming: HashMap<MessageKind, u64>,
    outgoing: HashMap<MessageKind, u64>,
    last_keep_alive_ms: i64,
}

impl Server {
    pub fn new(mut config: Config, state: State) -> Self {
        config.host = true;
        let last_keep_alive_ms = state.clock.now_millis();
        Self {
            peer: PeerController::new(config, state),
            registry: ClientRegistry::new(),
            required_clients: HashMap::new(),
            incoming: HashMap::new(),
            outgoing: HashMap::new(),
            last_keep_alive_ms,
        }
    }

    pub fn start(&mut self) -> bool {
        self.peer.start()
    }

    pub fn stop(&mut self) {
        self.peer.stop()
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_connected()
    }

    pub fn config(&self) -> &Config {
        self.peer.config()
    }

    /// Shared handle to the client registry; safe to read from other
    /// threads.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Place a message on the paced outbound queue; it will fan out
    /// when released.
    pub fn queue(&mut self, message: Message) {
        self.peer.queue(message);
    }

    /// Expected clients that have not been marked ready yet.
    pub fn required_clients(&self) -> &HashMap<ClientId, bool> {
        &self.required_clients
    }

    /// Mark an expected client as ready.
    pub fn set_client_ready(&mut self, client_id: ClientId) {
        if let Some(ready) = self.required_clients.get_mut(&client_id) {
            *ready = true;
        }
    }

    pub fn incoming_count(&self, kind: MessageKind) -> u64 {
        self.incoming.get(&kind).copied().unwrap_or(0)
    }

    pub fn outgoing_count(&self, kind: MessageKind) -> u64 {
        self.outgoing.get(&kind).copied().unwrap_or(0)
    }

    /// Receive-side policy: unknown senders are dropped, traffic
    /// refreshes liveness, connect/leave maintain the registry, and a
    /// broadcast-flagged message is re-fanned out.
    pub fn receive(&mut self, message: Message) {
        let sender_addr = message.sender_addr();
        let known_sender = sender_addr
            .map(|addr| self.registry.contains_addr(&addr))
            .unwrap_or(false);
        if !known_sender && message.kind() != MessageKind::ConnectRequest {
            warn!(?sender_addr, "no client found under this address");
            return;
        }

        *self.incoming.entry(message.kind()).or_insert(0) += 1;

        let now = self.peer.state().clock.now_millis();
        // Read before the touch below so the connect dedup window sees
        // the previous traffic time, not this message's.
        let previous_last_received = self.registry.last_received(message.sender_id());
        if message.sender_id() > 0 {
            self.registry.touch(message.sender_id(), now);
        }

        match message.body() {
            MessageBody::LeaveRequest => {
                self.unregister(message.sender_id(), UnregisterReason::Left);
            }
            MessageBody::ConnectRequest { client_id } => {
                let window = self.peer.config().time_since_last_connect_request;
                let passes_window = match previous_last_received {
                    // Never-seen clients register immediately.
                    None => true,
                    Some(last) => now - last > window,
                };
                if passes_window {
                    if let Some(addr) = sender_addr {
                        self.register(*client_id, addr, now);
                    } else {
                        warn!(client_id, "connect request without a sender address");
                    }
                }
            }
            _ => {}
        }

        if !message.kind().is_instant_server() {
            self.peer.receive(message.clone());
        }

        if message.broadcast() {
            let mut rebroadcast = message;
            // A fresh fan-out gets a fresh ID.
            rebroadcast.clear_id();
            rebroadcast.set_receiver_id(0);
            let except = if rebroadcast.send_broadcast_back_to_sender() {
                0
            } else {
                rebroadcast.sender_id()
            };
            if let Err(e) = self.fan_out(rebroadcast, except) {
                warn!("re-broadcast failed: {e}");
            }
        }
    }

    fn register(&mut self, client_id: ClientId, addr: std::net::SocketAddr, now_ms: i64) {
        if self.registry.contains(client_id) {
            info!(client_id, "client already in list, could be a re-join");
            self.unregister(client_id, UnregisterReason::Rejoin);
        }

        let expected = &self.peer.config().expected_client_ids;
        if expected.is_empty() || expected.contains(&client_id) {
            self.required_clients.insert(client_id, false);
        }

        self.registry.insert(client_id, addr);
        self.registry.touch(client_id, now_ms);
        info!(client_id, %addr, "added client");

        // Defer the next keep-alive one interval so it cannot race a
        // client that joined this tick.
        self.last_keep_alive_ms = now_ms;

        self.peer.state().processors.fire_on_register(client_id);
        self.peer.state_mut().server_hooks.on_register(client_id);
    }

    /// Drop a client from every map and fire the unregister hooks.
    /// Does nothing for clients that are not registered.
    pub fn unregister(&mut self, client_id: ClientId, reason: UnregisterReason) {
        let addr = self.registry.address_of(client_id);
        if !self.registry.remove(client_id) {
            return;
        }
        info!(client_id, ?reason, ?addr, "bye");
        self.required_clients.remove(&client_id);
        self.peer.state().processors.fire_on_unregister(client_id);
        self.peer.state_mut().server_hooks.on_unregister(client_id);
    }

    pub(crate) fn peer(&self) -> &PeerController {
        &self.peer
    }

    pub(crate) fn peer_mut(&mut self) -> &mut PeerController {
        &mut self.peer
    }

    pub(crate) fn count_outgoing(&mut self, kind: MessageKind) {
        *self.outgoing.entry(kind).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReliableMode;
    use crate::test_util::{recording_state, RecordingHandle, RecordingHooks};
    use bytes::Bytes;
    use std::net::SocketAddr;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn server_with(config: Config) -> (Server, RecordingHandle, RecordingHooks) {
        let (state, handle) = recording_state();
        let hooks = RecordingHooks::default();
        let state = state.with_server_hooks(Box::new(hooks.clone()));
        (Server::new(config, state), handle, hooks)
    }

    fn connect_from(client_id: ClientId, from: SocketAddr) -> Message {
        let mut m = Message::connect_request(client_id);
        m.set_sender_id(client_id);
        m.set_sender_addr(from);
        m
    }

    fn app_from(client_id: ClientId, from: SocketAddr) -> Message {
        let mut m = Message::app(Bytes::from_static(b"data"), ReliableMode::Unreliable);
        m.set_sender_id(client_id);
        m.set_sender_addr(from);
        m
    }

    #[test]
    fn connect_registers_and_keep_alive_pulses() {
        let config = Config::builder()
            .keep_alive_interval(100)
            .timeout_threshold(500)
            .build();
        let (mut server, handle, hooks) = server_with(config);

        handle.clock.set(10);
        server.receive(connect_from(7, addr(7000)));

        assert_eq!(server.registry().address_of(7), Some(addr(7000)));
        assert_eq!(server.registry().last_received(7), Some(10));
        assert_eq!(hooks.registered(), vec![7]);

        handle.clock.set(120);
        server.process();

        let sent = handle.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), MessageKind::KeepAlive);
        assert_eq!(sent[0].recipient(), Some(addr(7000)));
    }

    #[test]
    fn silent_client_is_evicted_with_one_unregister() {
        let config = Config::builder()
            .keep_alive_interval(100)
            .timeout_threshold(500)
            .build();
        let (mut server, handle, hooks) = server_with(config);

        handle.clock.set(10);
        server.receive(connect_from(7, addr(7000)));

        handle.clock.set(600);
        server.process();

        assert!(server.registry().is_empty());
        assert!(server.registry().last_received(7).is_none());
        assert!(server.required_clients().is_empty());
        assert_eq!(hooks.unregistered(), vec![7]);

        // Another tick must not fire the hook again.
        handle.clock.set(700);
        server.process();
        assert_eq!(hooks.unregistered(), vec![7]);
    }

    #[test]
    fn rejoin_unregisters_then_registers_with_the_new_address() {
        let (mut server, handle, hooks) = server_with(Config::default());

        handle.clock.set(5);
        server.receive(connect_from(4, addr(4000)));
        assert_eq!(hooks.registered(), vec![4]);

        handle.clock.set(2_000);
        server.receive(connect_from(4, addr(4001)));

        assert_eq!(hooks.unregistered(), vec![4]);
        assert_eq!(hooks.registered(), vec![4, 4]);
        assert_eq!(server.registry().address_of(4), Some(addr(4001)));
        assert_eq!(server.registry().len(), 1);
    }

    #[test]
    fn repeat_connect_inside_the_dedup_window_is_ignored() {
        let config = Config::builder().time_since_last_connect_request(1_000).build();
        let (mut server, handle, hooks) = server_with(config);

        handle.clock.set(5);
        server.receive(connect_from(4, addr(4000)));
        handle.clock.set(200);
        server.receive(connect_from(4, addr(4001)));

        assert_eq!(hooks.registered(), vec![4]);
        assert_eq!(server.registry().address_of(4), Some(addr(4000)));
    }

    #[test]
    fn unknown_sender_messages_are_dropped() {
        let (mut server, handle, _hooks) = server_with(Config::default());

        server.receive(app_from(9, addr(9000)));

        assert!(handle.received().is_empty());
        assert_eq!(server.incoming_count(MessageKind::App), 0);
    }

    #[test]
    fn known_sender_traffic_is_counted_and_refreshes_liveness() {
        let (mut server, handle, _hooks) = server_with(Config::default());

        handle.clock.set(5);
        server.receive(connect_from(7, addr(7000)));
        handle.clock.set(50);
        server.receive(app_from(7, addr(7000)));

        assert_eq!(server.incoming_count(MessageKind::App), 1);
        assert_eq!(server.incoming_count(MessageKind::ConnectRequest), 1);
        assert_eq!(server.registry().last_received(7), Some(50));
        assert_eq!(handle.received().len(), 1);
    }

    #[test]
    fn leave_request_unregisters() {
        let (mut server, handle, hooks) = server_with(Config::default());

        handle.clock.set(5);
        server.receive(connect_from(7, addr(7000)));

        let mut leave = Message::leave_request();
        leave.set_sender_id(7);
        leave.set_sender_addr(addr(7000));
        handle.clock.set(60);
        server.receive(leave);

        assert!(server.registry().is_empty());
        assert_eq!(hooks.unregistered(), vec![7]);
        // Leave requests are server business, not application traffic.
        assert!(handle.received().is_empty());
    }

    #[test]
    fn allowlist_limits_required_clients_but_not_registration() {
        let config = Config::builder().expected_client_ids([1, 2]).build();
        let (mut server, handle, _hooks) = server_with(config);

        handle.clock.set(5);
        server.receive(connect_from(1, addr(1000)));
        server.receive(connect_from(9, addr(9000)));

        assert!(server.registry().contains(1));
        assert!(server.registry().contains(9));
        assert!(server.required_clients().contains_key(&1));
        assert!(!server.required_clients().contains_key(&9));

        server.set_client_ready(1);
        assert_eq!(server.required_clients().get(&1), Some(&true));
    }

    #[test]
    fn broadcast_on_receive_excludes_the_sender() {
        let (mut server, handle, _hooks) = server_with(Config::default());

        handle.clock.set(5);
        server.receive(connect_from(1, addr(1000)));
        server.receive(connect_from(2, addr(2000)));
        server.receive(connect_from(3, addr(3000)));
        handle.clear_sent();

        let mut m = app_from(2, addr(2000));
        m.set_broadcast(true);
        server.receive(m);

        let sent = handle.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.recipient() != Some(addr(2000))));
        let recipients: Vec<_> = sent.iter().filter_map(|m| m.recipient()).collect();
        assert!(recipients.contains(&addr(1000)));
        assert!(recipients.contains(&addr(3000)));

        // The server application still sees the message itself.
        assert_eq!(handle.received().len(), 1);
    }

    #[test]
    fn broadcast_back_to_sender_includes_everyone() {
        let (mut server, handle, _hooks) = server_with(Config::default());

        handle.clock.set(5);
        server.receive(connect_from(1, addr(1000)));
        server.receive(connect_from(2, addr(2000)));
        handle.clear_sent();

        let mut m = app_from(2, addr(2000));
        m.set_broadcast(true);
        m.set_send_broadcast_back_to_sender(true);
        server.receive(m);

        assert_eq!(handle.sent().len(), 2);
    }
}
