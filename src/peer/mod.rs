//! Per-peer pipeline core: send/receive pipelines, the paced outbound
//! queue, and the lifecycle around them. Per-area logic lives in
//! submodules (send, receive, tick).

mod assembler;
mod fragment;
mod id_provider;
mod processor;
mod receive;
mod send;
mod tick;

pub use id_provider::{IdProvider, PerClientIdProvider, ReliableModeIdProvider};
pub use processor::{shared, CongestionControl, Processor, ProcessorChain, SharedProcessor};

use std::collections::VecDeque;

use tracing::{error, info};

use crate::config::{Config, State};
use crate::protocol::Message;

use assembler::PartAssembler;

/// A protocol endpoint: owns the pipelines, the paced outbound queue,
/// and the transport lifecycle. The host drives it by calling
/// [`process`](PeerController::process) periodically; all pipeline work
/// happens on that thread.
pub struct PeerController {
    config: Config,
    state: State,
    queued: VecDeque<Message>,
    assembler: PartAssembler,
    connected: bool,
    last_tick_ms: i64,
    queue_delay_inc: i64,
}

impl PeerController {
    pub fn new(config: Config, state: State) -> Self {
        let now = state.clock.now_millis();
        let assembler = PartAssembler::new(config.part_timeout);
        Self {
            config,
            state,
            queued: VecDeque::new(),
            assembler,
            connected: false,
            last_tick_ms: now,
            queue_delay_inc: 0,
        }
    }

    /// Open the transport. On failure the connected flag stays false
    /// and the caller decides whether to retry.
    pub fn start(&mut self) -> bool {
        match self.state.udp.start() {
            Ok(()) => {
                self.connected = true;
                true
            }
            Err(e) => {
                error!("failed to start UDP transport: {e}");
                false
            }
        }
    }

    /// Announce departure and close the transport. Queued messages are
    /// discarded.
    pub fn stop(&mut self) {
        info!("stopping UDP peer controller");
        if self.connected {
            let _ = self.send(Message::leave_request());
        }
        self.queued.clear();
        self.state.udp.stop();
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Place a message on the paced outbound queue. It is released in
    /// FIFO order, at most one per eligible tick.
    pub fn queue(&mut self, message: Message) {
        self.queued.push_back(message);
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub(crate) fn state(&self) -> &State {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }
}
