//! Transport seam: the socket/codec collaborator traits the pipeline
//! core drives, plus the bundled tokio UDP driver.

mod clock;
mod driver;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use driver::UdpSocketPeer;

use std::io;

use bytes::Bytes;

use crate::error::{DecodeError, EncodeError};
use crate::protocol::Message;

/// Datagram I/O and payload codec collaborator.
///
/// This is an abstraction over the raw socket and its serialization,
/// introduced so the pipeline core can be exercised against a recorded
/// transport in tests. Implementations must not block: `send` is
/// expected to hand the datagram to the kernel buffer and return, and
/// `process` only drains whatever has already arrived.
pub trait UdpPeer: Send {
    /// Open the socket and start delivering datagrams into the inbox.
    fn start(&mut self) -> io::Result<()>;

    /// Close the socket; pending inbox contents are discarded.
    fn stop(&mut self);

    /// Drive I/O for one tick and drain received messages, in arrival
    /// order, onto the processing thread.
    fn process(&mut self) -> Vec<Message>;

    /// Transmit the message's encoded payload to its recipient.
    /// Transport errors are logged, not surfaced; UDP gives no delivery
    /// feedback either way.
    fn send(&mut self, message: &Message);

    /// Populate `message.payload` with its encoded bytes.
    fn create_payload(&self, message: &mut Message) -> Result<(), EncodeError>;

    /// Decode bytes produced by `create_payload` back into a message.
    /// Used when a reassembled fragment group yields the original
    /// encoded form of its parent.
    fn decode_payload(&self, bytes: Bytes) -> Result<Message, DecodeError>;
}

/// External application receiver: the end of the receive pipeline for
/// everything that is not a protocol-level message.
pub trait MessageReceiver: Send {
    fn receive(&mut self, message: Message);
}

impl<F> MessageReceiver for F
where
    F: FnMut(Message) + Send,
{
    fn receive(&mut self, message: Message) {
        self(message)
    }
}
