//! Peer configuration and the collaborator bag it is paired with.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::peer::{CongestionControl, IdProvider, ProcessorChain, ReliableModeIdProvider};
use crate::protocol::constants::{
    DEFAULT_KEEP_ALIVE_INTERVAL_MS, DEFAULT_MAX_RESENDS, DEFAULT_MAX_UDP_PACKET_SIZE,
    DEFAULT_PART_TIMEOUT, DEFAULT_QUEUED_MESSAGES_DELAY_MS, DEFAULT_RESEND_INTERVAL_MS,
    DEFAULT_TIMEOUT_THRESHOLD_MS, DEFAULT_TIME_SINCE_LAST_CONNECT_REQUEST_MS,
};
use crate::protocol::ClientId;
use crate::server::{NoopServerHooks, ServerHooks};
use crate::transport::{Clock, MessageReceiver, MonotonicClock, UdpPeer};

/// Plain peer settings. All intervals are monotonic milliseconds.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hard cap on a single datagram payload, in bytes.
    pub maximum_udp_packet_size: usize,

    /// Split oversize messages into parts instead of failing the send.
    pub auto_split_too_big_messages: bool,

    /// Minimum gap between paced queue dequeues.
    pub queued_messages_delay: i64,

    /// Server heartbeat cadence while at least one client is registered.
    pub keep_alive_interval: i64,

    /// Silence span after which a client is considered gone.
    pub timeout_threshold: i64,

    /// Dedup window for repeated connect requests from one client.
    pub time_since_last_connect_request: i64,

    /// Allowlist of client IDs; empty accepts any.
    pub expected_client_ids: HashSet<ClientId>,

    /// Marks this peer as the server.
    pub host: bool,

    /// Where a client peer sends messages that carry no explicit
    /// recipient. Unused on the server, which addresses per client.
    pub remote_addr: Option<SocketAddr>,

    /// Identity stamped onto locally-created messages.
    pub sender_id: ClientId,

    /// TTL for incomplete fragment reassembly groups.
    pub part_timeout: i64,

    /// Interval between resends of unacked reliable messages.
    pub resend_interval: i64,

    /// Resend attempts before an unacked reliable message is dropped.
    pub max_resends: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maximum_udp_packet_size: DEFAULT_MAX_UDP_PACKET_SIZE,
            auto_split_too_big_messages: true,
            queued_messages_delay: DEFAULT_QUEUED_MESSAGES_DELAY_MS,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL_MS,
            timeout_threshold: DEFAULT_TIMEOUT_THRESHOLD_MS,
            time_since_last_connect_request: DEFAULT_TIME_SINCE_LAST_CONNECT_REQUEST_MS,
            expected_client_ids: HashSet::new(),
            host: false,
            remote_addr: None,
            sender_id: 0,
            part_timeout: DEFAULT_PART_TIMEOUT.as_millis() as i64,
            resend_interval: DEFAULT_RESEND_INTERVAL_MS,
            max_resends: DEFAULT_MAX_RESENDS,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Consuming builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn maximum_udp_packet_size(mut self, bytes: usize) -> Self {
        self.config.maximum_udp_packet_size = bytes;
        self
    }

    pub fn auto_split_too_big_messages(mut self, on: bool) -> Self {
        self.config.auto_split_too_big_messages = on;
        self
    }

    pub fn queued_messages_delay(mut self, millis: i64) -> Self {
        self.config.queued_messages_delay = millis;
        self
    }

    pub fn keep_alive_interval(mut self, millis: i64) -> Self {
        self.config.keep_alive_interval = millis;
        self
    }

    pub fn timeout_threshold(mut self, millis: i64) -> Self {
        self.config.timeout_threshold = millis;
        self
    }

    pub fn time_since_last_connect_request(mut self, millis: i64) -> Self {
        self.config.time_since_last_connect_request = millis;
        self
    }

    pub fn expected_client_ids(mut self, ids: impl IntoIterator<Item = ClientId>) -> Self {
        self.config.expected_client_ids = ids.into_iter().collect();
        self
    }

    pub fn host(mut self, host: bool) -> Self {
        self.config.host = host;
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.config.remote_addr = Some(addr);
        self
    }

    pub fn sender_id(mut self, id: ClientId) -> Self {
        self.config.sender_id = id;
        self
    }

    pub fn part_timeout(mut self, millis: i64) -> Self {
        self.config.part_timeout = millis;
        self
    }

    pub fn resend_interval(mut self, millis: i64) -> Self {
        self.config.resend_interval = millis;
        self
    }

    pub fn max_resends(mut self, attempts: u32) -> Self {
        self.config.max_resends = attempts;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// The collaborator bag a peer runs against: transport, clock, ID
/// provider, processor chain, and the application-facing receiver.
///
/// Built once, then moved into the controller; the chain and providers
/// are not reachable for mutation afterwards, which is what makes the
/// chain immutable after start.
pub struct State {
    pub(crate) udp: Box<dyn UdpPeer>,
    pub(crate) receiver: Box<dyn MessageReceiver>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) id_provider: Box<dyn IdProvider>,
    pub(crate) processors: ProcessorChain,
    pub(crate) congestion: Option<Box<dyn CongestionControl>>,
    pub(crate) server_hooks: Box<dyn ServerHooks>,
}

impl State {
    pub fn new(udp: Box<dyn UdpPeer>, receiver: Box<dyn MessageReceiver>) -> Self {
        Self {
            udp,
            receiver,
            clock: Arc::new(MonotonicClock::new()),
            id_provider: Box::new(ReliableModeIdProvider::new()),
            processors: ProcessorChain::new(),
            congestion: None,
            server_hooks: Box::new(NoopServerHooks),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_provider(mut self, provider: Box<dyn IdProvider>) -> Self {
        self.id_provider = provider;
        self
    }

    pub fn with_processors(mut self, processors: ProcessorChain) -> Self {
        self.processors = processors;
        self
    }

    pub fn with_congestion_control(mut self, congestion: Box<dyn CongestionControl>) -> Self {
        self.congestion = Some(congestion);
        self
    }

    pub fn with_server_hooks(mut self, hooks: Box<dyn ServerHooks>) -> Self {
        self.server_hooks = hooks;
        self
    }
}
