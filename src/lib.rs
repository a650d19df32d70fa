//! Reliable, ordered, multi-client messaging over UDP.
//!
//! `relnet` is a thin messaging layer for real-time applications that
//! need low-latency datagrams with opt-in reliability, not a TCP stream
//! per peer. Each message picks its own delivery guarantee
//! ([`ReliableMode`]): fire-and-forget, sequenced (ordered by ID,
//! duplicates dropped), or acked (retransmitted until acknowledged).
//! Oversize messages are split into parts and reassembled on the far
//! side; a server peer tracks clients, evicts the silent ones, and fans
//! broadcasts out to everyone registered.
//!
//! The core is synchronous and tick-driven: the host calls `process()`
//! periodically and every pipeline stage runs on that thread. Transport
//! I/O happens at the edge, in a [`transport::UdpPeer`] implementation;
//! the bundled [`transport::UdpSocketPeer`] uses a tokio socket with a
//! background receive task.
//!
//! ## Example: Server
//!
//! ```rust,no_run
//! use relnet::{Config, Server, State};
//! use relnet::transport::UdpSocketPeer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::builder()
//!         .keep_alive_interval(1_000)
//!         .timeout_threshold(10_000)
//!         .build();
//!     let udp = UdpSocketPeer::new("0.0.0.0:4567".parse().unwrap());
//!     let state = State::new(
//!         Box::new(udp),
//!         Box::new(|message: relnet::Message| println!("got {message:?}")),
//!     );
//!
//!     let mut server = Server::new(config, state);
//!     assert!(server.start());
//!     loop {
//!         server.process();
//!         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!     }
//! }
//! ```
//!
//! ## Example: Client
//!
//! ```rust,no_run
//! use relnet::{Config, Message, PeerController, ReliableMode, State};
//! use relnet::transport::UdpSocketPeer;
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::builder()
//!         .sender_id(7)
//!         .remote_addr("127.0.0.1:4567".parse().unwrap())
//!         .build();
//!     let udp = UdpSocketPeer::new("0.0.0.0:0".parse().unwrap());
//!     let state = State::new(Box::new(udp), Box::new(|_message: relnet::Message| {}));
//!
//!     let mut client = PeerController::new(config, state);
//!     assert!(client.start());
//!     let _ = client.send(Message::connect_request(7));
//!     let _ = client.send(Message::app(Bytes::from_static(b"hello"), ReliableMode::AckPacket));
//!     loop {
//!         client.process();
//!         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod peer;
pub mod processors;
pub mod protocol;
pub mod server;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_util;

pub use config::{Config, ConfigBuilder, State};
pub use error::{RelnetError, SendError};
pub use peer::PeerController;
pub use protocol::{Message, MessageBody, MessageKind, ReliableMode};
pub use server::{Server, ServerHooks, UnregisterReason};
