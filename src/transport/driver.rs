//! Bundled UDP driver: a tokio socket with a background receive task
//! that funnels decoded messages through an mpsc inbox onto whichever
//! thread calls `process()`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::{DecodeError, EncodeError};
use crate::protocol::{Message, Wire};
use crate::transport::UdpPeer;

/// Default UDP transport. Must be started from within a tokio runtime;
/// everything after `start` is callable from plain synchronous code.
pub struct UdpSocketPeer {
    bind_addr: SocketAddr,
    socket: Option<Arc<UdpSocket>>,
    inbox: Option<mpsc::UnboundedReceiver<Message>>,
    cancel: CancellationToken,
    recv_task: Option<JoinHandle<()>>,
    recv_buf_size: usize,
}

impl UdpSocketPeer {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            socket: None,
            inbox: None,
            cancel: CancellationToken::new(),
            recv_task: None,
            // Slightly above any sane datagram cap so an oversize probe
            // surfaces as a decode failure instead of an OS error.
            recv_buf_size: 64 * 1024,
        }
    }

    /// Local address after `start`; useful with port 0 binds.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl UdpPeer for UdpSocketPeer {
    fn start(&mut self) -> io::Result<()> {
        let std_socket = std::net::UdpSocket::bind(self.bind_addr)?;
        std_socket.set_nonblocking(true)?;
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);

        let (tx, rx) = mpsc::unbounded_channel();
        self.cancel = CancellationToken::new();

        let task = tokio::spawn(run_recv_loop(
            socket.clone(),
            tx,
            self.cancel.clone(),
            self.recv_buf_size,
        ));

        debug!(addr = %socket.local_addr()?, "udp_peer_started");
        self.socket = Some(socket);
        self.inbox = Some(rx);
        self.recv_task = Some(task);
        Ok(())
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
        self.socket = None;
        self.inbox = None;
    }

    fn process(&mut self) -> Vec<Message> {
        let mut delivered = Vec::new();
        if let Some(inbox) = self.inbox.as_mut() {
            while let Ok(message) = inbox.try_recv() {
                delivered.push(message);
            }
        }
        delivered
    }

    fn send(&mut self, message: &Message) {
        let Some(socket) = self.socket.as_ref() else {
            error!("send on a stopped transport");
            return;
        };
        let Some(recipient) = message.recipient() else {
            error!(msg_id = message.msg_id(), "send without a recipient address");
            return;
        };
        let Some(payload) = message.payload() else {
            error!(msg_id = message.msg_id(), "send without an encoded payload");
            return;
        };

        match socket.try_send_to(payload, recipient) {
            Ok(written) if written < payload.len() => {
                warn!(
                    msg_id = message.msg_id(),
                    written,
                    len = payload.len(),
                    "datagram truncated by the OS"
                );
            }
            Ok(_) => {
                trace!(msg_id = message.msg_id(), to = %recipient, "udp_sent");
            }
            Err(e) => {
                // Kernel buffer full or a transient route error. UDP
                // gives no delivery guarantee anyway, so drop and log.
                warn!(msg_id = message.msg_id(), to = %recipient, "udp send failed: {e}");
            }
        }
    }

    fn create_payload(&self, message: &mut Message) -> Result<(), EncodeError> {
        let mut buf = BytesMut::new();
        message.encode_wire(&mut buf)?;
        message.set_payload(buf.freeze());
        Ok(())
    }

    fn decode_payload(&self, bytes: Bytes) -> Result<Message, DecodeError> {
        let mut src = bytes;
        Message::decode_wire(&mut src)
    }
}

impl Drop for UdpSocketPeer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_recv_loop(
    socket: Arc<UdpSocket>,
    tx: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
    recv_buf_size: usize,
) {
    let mut buf = vec![0u8; recv_buf_size];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("udp receive loop cancelled");
                break;
            }
            res = socket.recv_from(&mut buf) => {
                let (len, from) = match res {
                    Ok(x) => x,
                    Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                        // Windows ICMP port unreachable - ignore
                        continue;
                    }
                    Err(e) => {
                        error!("UDP socket error: {e}");
                        continue;
                    }
                };

                let mut slice = &buf[..len];
                match Message::decode_wire(&mut slice) {
                    Ok(mut message) => {
                        message.set_sender_addr(from);
                        if tx.send(message).is_err() {
                            // Inbox dropped, the peer is shutting down.
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(from = %from, "undecodable datagram dropped: {e}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReliableMode;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("relnet=trace")
            .try_init();
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    async fn drain_one(peer: &mut UdpSocketPeer) -> Option<Message> {
        for _ in 0..200 {
            let mut delivered = peer.process();
            if let Some(m) = delivered.pop() {
                return Some(m);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn round_trips_a_message_over_loopback() {
        init_tracing();
        let mut a = UdpSocketPeer::new(loopback());
        let mut b = UdpSocketPeer::new(loopback());
        a.start().unwrap();
        b.start().unwrap();

        let mut message = Message::app(Bytes::from_static(b"ping"), ReliableMode::Unreliable);
        message.set_msg_id(1);
        message.set_recipient(b.local_addr().unwrap());
        a.create_payload(&mut message).unwrap();
        a.send(&message);

        let received = drain_one(&mut b).await.expect("message delivered");
        assert_eq!(received.msg_id(), 1);
        assert_eq!(received.sender_addr(), a.local_addr());

        a.stop();
        b.stop();
    }

    #[tokio::test]
    async fn drops_undecodable_datagrams() {
        let mut b = UdpSocketPeer::new(loopback());
        b.start().unwrap();

        let raw = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        raw.send_to(&[0xFF, 0x01], b.local_addr().unwrap()).unwrap();

        // Give the receive loop a moment; nothing must be delivered.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(b.process().is_empty());
        b.stop();
    }
}
