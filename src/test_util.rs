//! Shared test fixtures: a recording transport, a capturing receiver,
//! a hand-driven clock, and hook recorders.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};

use crate::config::State;
use crate::error::{DecodeError, EncodeError};
use crate::protocol::{ClientId, Message, Wire};
use crate::server::ServerHooks;
use crate::transport::{ManualClock, MessageReceiver, UdpPeer};

fn locked<T>(m: &Arc<Mutex<T>>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Transport double: records what the pipeline transmits and delivers
/// whatever the test pushes into its inbox. Encoding uses the real wire
/// codec so payload sizes are honest.
pub(crate) struct RecordingPeer {
    sent: Arc<Mutex<Vec<Message>>>,
    inbox: Arc<Mutex<VecDeque<Message>>>,
    fail_encode: bool,
}

impl UdpPeer for RecordingPeer {
    fn start(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn process(&mut self) -> Vec<Message> {
        locked(&self.inbox).drain(..).collect()
    }

    fn send(&mut self, message: &Message) {
        locked(&self.sent).push(message.clone());
    }

    fn create_payload(&self, message: &mut Message) -> Result<(), EncodeError> {
        if self.fail_encode {
            return Err(EncodeError::MissingPayload);
        }
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

struct CapturingReceiver {
    received: Arc<Mutex<Vec<Message>>>,
}

impl MessageReceiver for CapturingReceiver {
    fn receive(&mut self, message: Message) {
        locked(&self.received).push(message);
    }
}

/// Assertion-side view of a [`RecordingPeer`]-backed state.
#[derive(Clone)]
pub(crate) struct RecordingHandle {
    sent: Arc<Mutex<Vec<Message>>>,
    received: Arc<Mutex<Vec<Message>>>,
    inbox: Arc<Mutex<VecDeque<Message>>>,
    pub(crate) clock: Arc<ManualClock>,
}

impl RecordingHandle {
    pub(crate) fn sent(&self) -> Vec<Message> {
        locked(&self.sent).clone()
    }

    pub(crate) fn sent_len(&self) -> usize {
        locked(&self.sent).len()
    }

    pub(crate) fn clear_sent(&self) {
        locked(&self.sent).clear();
    }

    pub(crate) fn received(&self) -> Vec<Message> {
        locked(&self.received).clone()
    }

    /// Stage a message for delivery on the next transport tick.
    pub(crate) fn push_inbound(&self, message: Message) {
        locked(&self.inbox).push_back(message);
    }
}

fn build_state(fail_encode: bool) -> (State, RecordingHandle) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let received = Arc::new(Mutex::new(Vec::new()));
    let inbox = Arc::new(Mutex::new(VecDeque::new()));
    let clock = Arc::new(ManualClock::new(0));

    let peer = RecordingPeer {
        sent: sent.clone(),
        inbox: inbox.clone(),
        fail_encode,
    };
    let receiver = CapturingReceiver {
        received: received.clone(),
    };

    let state = State::new(Box::new(peer), Box::new(receiver)).with_clock(clock.clone());
    let handle = RecordingHandle {
        sent,
        received,
        inbox,
        clock,
    };
    (state, handle)
}

/// A state wired to a recording transport, capturing receiver, and
/// manual clock starting at 0.
pub(crate) fn recording_state() -> (State, RecordingHandle) {
    build_state(false)
}

/// Same, but `create_payload` always fails.
pub(crate) fn recording_state_failing_encode() -> (State, RecordingHandle) {
    build_state(true)
}

/// Records registry hook firings for assertions.
#[derive(Clone, Default)]
pub(crate) struct RecordingHooks {
    pub(crate) registered: Arc<Mutex<Vec<ClientId>>>,
    pub(crate) unregistered: Arc<Mutex<Vec<ClientId>>>,
}

impl RecordingHooks {
    pub(crate) fn registered(&self) -> Vec<ClientId> {
        locked(&self.registered).clone()
    }

    pub(crate) fn unregistered(&self) -> Vec<ClientId> {
        locked(&self.unregistered).clone()
    }
}

impl ServerHooks for RecordingHooks {
    fn on_register(&mut self, client_id: ClientId) {
        locked(&self.registered).push(client_id);
    }

    fn on_unregister(&mut self, client_id: ClientId) {
        locked(&self.unregistered).push(client_id);
    }
}
