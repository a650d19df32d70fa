//! The universal message unit and its tagged body kinds.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use bitflags::bitflags;
use bytes::Bytes;

use crate::config::Config;
use crate::protocol::reliability::ReliableMode;

/// Identifies a client within one server's registry.
pub type ClientId = u32;

/// Per-stream monotonic message identifier. 0 means "unassigned".
pub type MessageId = u64;

bitflags! {
    /// Per-message delivery flags carried on the wire.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MessageFlags: u8 {
        /// This transmission is a retry of an earlier one.
        const RESEND = 0b0000_0001;
        /// The server should fan this message out to all clients.
        const BROADCAST = 0b0000_0010;
        /// A re-broadcast includes the original sender.
        const BROADCAST_BACK_TO_SENDER = 0b0000_0100;
    }
}

bitflags! {
    /// Optional payload transforms a message may request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FeatureFlags: u8 {
        const COMPRESSION = 0b0000_0001;
        const ENCRYPTION = 0b0000_0010;
    }
}

/// Lazily-resolved feature descriptor set. The core only guarantees it
/// is resolved exactly once before any receive-side processor sees the
/// message; what the flags mean is up to the payload collaborators.
#[derive(Debug, Clone, Default)]
pub struct MessageFeatures {
    flags: FeatureFlags,
    resolved: bool,
}

impl MessageFeatures {
    pub fn new(flags: FeatureFlags) -> Self {
        Self {
            flags,
            resolved: false,
        }
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Idempotent; the first call wins.
    pub fn resolve(&mut self) {
        self.resolved = true;
    }
}

/// Kind-specific message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Opaque application data.
    App(Bytes),
    /// One fragment of an oversize message.
    Part {
        parent_id: MessageId,
        index: u32,
        count: u32,
        bytes: Bytes,
    },
    /// A batch of message IDs being acknowledged.
    Ack { ids: BTreeSet<MessageId> },
    /// A client announcing itself to the server.
    ConnectRequest { client_id: ClientId },
    /// A peer leaving the session.
    LeaveRequest,
    /// Idle-stream heartbeat keeping reliable ID streams advancing.
    KeepAlive,
}

/// Discriminant of [`MessageBody`], used for dispatch tables and
/// per-class counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    App,
    Part,
    Ack,
    ConnectRequest,
    LeaveRequest,
    KeepAlive,
}

impl MessageKind {
    /// Protocol-level kinds are handled synchronously on the pipeline
    /// thread instead of being forwarded to the application receiver.
    pub fn is_instant(&self) -> bool {
        !matches!(self, MessageKind::App)
    }

    /// Kinds the server consumes itself without running the peer-side
    /// receive pipeline at all.
    pub fn is_instant_server(&self) -> bool {
        matches!(self, MessageKind::ConnectRequest | MessageKind::LeaveRequest)
    }
}

/// The universal unit flowing through the pipelines.
///
/// A message is created either by the application (send path) or by the
/// transport (receive path), resolved once, and carries its encoded
/// payload only after the payload stage has run.
#[derive(Debug, Clone)]
pub struct Message {
    msg_id: MessageId,
    sender_id: ClientId,
    receiver_id: ClientId,
    reliable_mode: ReliableMode,
    body: MessageBody,
    flags: MessageFlags,
    features: MessageFeatures,
    /// Encoded wire bytes, populated by the payload stage.
    payload: Option<Bytes>,
    recipient: Option<SocketAddr>,
    sender_addr: Option<SocketAddr>,
    resolved: bool,
}

impl Message {
    fn new(body: MessageBody, reliable_mode: ReliableMode) -> Self {
        Self {
            msg_id: 0,
            sender_id: 0,
            receiver_id: 0,
            reliable_mode,
            body,
            flags: MessageFlags::default(),
            features: MessageFeatures::default(),
            payload: None,
            recipient: None,
            sender_addr: None,
            resolved: false,
        }
    }

    /// An application message with the requested delivery guarantee.
    pub fn app(bytes: impl Into<Bytes>, reliable_mode: ReliableMode) -> Self {
        Self::new(MessageBody::App(bytes.into()), reliable_mode)
    }

    /// One fragment of an oversize message; inherits the parent's
    /// delivery guarantee.
    pub fn part(
        parent_id: MessageId,
        index: u32,
        count: u32,
        bytes: Bytes,
        reliable_mode: ReliableMode,
    ) -> Self {
        Self::new(
            MessageBody::Part {
                parent_id,
                index,
                count,
                bytes,
            },
            reliable_mode,
        )
    }

    /// Acknowledgement batch. Always unreliable: a lost ack is repaired
    /// by the next resend.
    pub fn ack(ids: BTreeSet<MessageId>) -> Self {
        Self::new(MessageBody::Ack { ids }, ReliableMode::Unreliable)
    }

    pub fn connect_request(client_id: ClientId) -> Self {
        Self::new(
            MessageBody::ConnectRequest { client_id },
            ReliableMode::AckPacket,
        )
    }

    pub fn leave_request() -> Self {
        Self::new(MessageBody::LeaveRequest, ReliableMode::Unreliable)
    }

    /// Empty heartbeat on the sequenced stream so that idle reliable ID
    /// streams keep advancing.
    pub fn keep_alive() -> Self {
        Self::new(MessageBody::KeepAlive, ReliableMode::SequenceNumber)
    }

    pub fn msg_id(&self) -> MessageId {
        self.msg_id
    }

    pub fn set_msg_id(&mut self, id: MessageId) {
        self.msg_id = id;
    }

    /// Forget the assigned ID so a fresh one is issued on the next send
    /// attempt (used when a broadcast is re-fanned out).
    pub fn clear_id(&mut self) {
        self.msg_id = 0;
    }

    pub fn sender_id(&self) -> ClientId {
        self.sender_id
    }

    pub fn set_sender_id(&mut self, id: ClientId) {
        self.sender_id = id;
    }

    pub fn receiver_id(&self) -> ClientId {
        self.receiver_id
    }

    pub fn set_receiver_id(&mut self, id: ClientId) {
        self.receiver_id = id;
    }

    pub fn reliable_mode(&self) -> ReliableMode {
        self.reliable_mode
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn kind(&self) -> MessageKind {
        match self.body {
            MessageBody::App(_) => MessageKind::App,
            MessageBody::Part { .. } => MessageKind::Part,
            MessageBody::Ack { .. } => MessageKind::Ack,
            MessageBody::ConnectRequest { .. } => MessageKind::ConnectRequest,
            MessageBody::LeaveRequest => MessageKind::LeaveRequest,
            MessageBody::KeepAlive => MessageKind::KeepAlive,
        }
    }

    pub fn is_part(&self) -> bool {
        matches!(self.body, MessageBody::Part { .. })
    }

    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: MessageFlags) {
        self.flags = flags;
    }

    pub fn is_resend(&self) -> bool {
        self.flags.contains(MessageFlags::RESEND)
    }

    pub fn mark_resend(&mut self) {
        self.flags.insert(MessageFlags::RESEND);
    }

    pub fn broadcast(&self) -> bool {
        self.flags.contains(MessageFlags::BROADCAST)
    }

    pub fn set_broadcast(&mut self, broadcast: bool) {
        self.flags.set(MessageFlags::BROADCAST, broadcast);
    }

    pub fn send_broadcast_back_to_sender(&self) -> bool {
        self.flags.contains(MessageFlags::BROADCAST_BACK_TO_SENDER)
    }

    pub fn set_send_broadcast_back_to_sender(&mut self, back: bool) {
        self.flags
            .set(MessageFlags::BROADCAST_BACK_TO_SENDER, back);
    }

    pub fn features(&self) -> &MessageFeatures {
        &self.features
    }

    pub fn features_mut(&mut self) -> &mut MessageFeatures {
        &mut self.features
    }

    pub fn set_features(&mut self, features: MessageFeatures) {
        self.features = features;
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    pub fn set_payload(&mut self, payload: Bytes) {
        self.payload = Some(payload);
    }

    pub fn recipient(&self) -> Option<SocketAddr> {
        self.recipient
    }

    pub fn set_recipient(&mut self, addr: SocketAddr) {
        self.recipient = Some(addr);
    }

    pub fn sender_addr(&self) -> Option<SocketAddr> {
        self.sender_addr
    }

    pub fn set_sender_addr(&mut self, addr: SocketAddr) {
        self.sender_addr = Some(addr);
    }

    /// Bind the message to its sending peer. Runs once; later calls are
    /// no-ops so a queued message is not re-stamped when it is finally
    /// released.
    pub fn resolve(&mut self, config: &Config) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        if self.sender_id == 0 {
            self.sender_id = config.sender_id;
        }
    }

    /// Invalidate any stale encoded payload so the payload stage
    /// re-encodes the current header fields.
    pub fn prepare_to_send(&mut self) {
        self.payload = None;
    }
}
