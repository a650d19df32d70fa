//! Pluggable per-message processors and the four-stage chain that runs
//! them.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::protocol::{ClientId, Message};

/// A pluggable hook invoked at named pipeline stages.
///
/// Every method defaults to a pass-through so an implementation only
/// overrides the stages it participates in. Returning `None` from a
/// stage discards the message there; the owning pipeline early-exits.
pub trait Processor: Send {
    /// Stable name used in discard traces.
    fn name(&self) -> &'static str {
        "processor"
    }

    /// Send side, first phase, ahead of the congestion-control slot.
    fn before_congestion_control(&mut self, message: Message) -> Option<Message> {
        Some(message)
    }

    /// Send side, second phase, immediately ahead of transmit.
    fn before_send(&mut self, message: Message) -> Option<Message> {
        Some(message)
    }

    /// Send side, after transmit.
    fn after_send(&mut self, message: Message) -> Option<Message> {
        Some(message)
    }

    /// Receive side, ahead of dispatch.
    fn before_receive(&mut self, message: Message) -> Option<Message> {
        Some(message)
    }

    /// Receive side, after dispatch.
    fn after_receive(&mut self, message: Message) -> Option<Message> {
        Some(message)
    }

    /// Periodic hook driven from the peer's `process()` tick. Returned
    /// messages are enqueued on the paced outbound queue.
    fn process(&mut self, _now_millis: i64) -> Vec<Message> {
        Vec::new()
    }

    fn on_register(&mut self, _client_id: ClientId) {}

    fn on_unregister(&mut self, _client_id: ClientId) {}
}

/// Gate sitting in the reserved congestion-control slot between the two
/// pre-send phases. No algorithm is mandated; the default admits
/// everything.
pub trait CongestionControl: Send {
    fn admit(&mut self, message: &Message) -> bool;
}

/// Handle shared between chain stages, so one processor instance can
/// sit in several stage lists at once.
pub type SharedProcessor = Arc<Mutex<dyn Processor>>;

pub fn shared<P: Processor + 'static>(processor: P) -> SharedProcessor {
    Arc::new(Mutex::new(processor))
}

fn lock(p: &SharedProcessor) -> MutexGuard<'_, dyn Processor + 'static> {
    p.lock().unwrap_or_else(|e| e.into_inner())
}

/// Four ordered stage lists. Order within each list is the insertion
/// order and stays stable; the chain is not mutated after the owning
/// peer starts.
#[derive(Default)]
pub struct ProcessorChain {
    sender_pre: Vec<SharedProcessor>,
    sender_post: Vec<SharedProcessor>,
    receiver_pre: Vec<SharedProcessor>,
    receiver_post: Vec<SharedProcessor>,
    /// Every distinct processor, for the periodic and registry hooks.
    all: Vec<SharedProcessor>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&mut self, processor: &SharedProcessor) {
        if !self.all.iter().any(|p| Arc::ptr_eq(p, processor)) {
            self.all.push(processor.clone());
        }
    }

    pub fn add_sender_pre(&mut self, processor: SharedProcessor) {
        self.track(&processor);
        self.sender_pre.push(processor);
    }

    pub fn add_sender_post(&mut self, processor: SharedProcessor) {
        self.track(&processor);
        self.sender_post.push(processor);
    }

    pub fn add_receiver_pre(&mut self, processor: SharedProcessor) {
        self.track(&processor);
        self.receiver_pre.push(processor);
    }

    pub fn add_receiver_post(&mut self, processor: SharedProcessor) {
        self.track(&processor);
        self.receiver_post.push(processor);
    }

    /// Register a processor that only participates in the periodic or
    /// registry hooks.
    pub fn add_processable(&mut self, processor: SharedProcessor) {
        self.track(&processor);
    }

    fn run<F>(
        list: &[SharedProcessor],
        stage: &'static str,
        mut message: Message,
        mut call: F,
    ) -> Option<Message>
    where
        F: FnMut(&mut (dyn Processor + 'static), Message) -> Option<Message>,
    {
        for processor in list {
            let mut guard = lock(processor);
            match call(&mut *guard, message) {
                Some(next) => message = next,
                None => {
                    trace!(processor = guard.name(), stage, "message discarded");
                    return None;
                }
            }
        }
        Some(message)
    }

    pub fn before_congestion_control(&self, message: Message) -> Option<Message> {
        Self::run(&self.sender_pre, "before_congestion_control", message, |p, m| {
            p.before_congestion_control(m)
        })
    }

    pub fn before_send(&self, message: Message) -> Option<Message> {
        Self::run(&self.sender_pre, "before_send", message, |p, m| p.before_send(m))
    }

    pub fn after_send(&self, message: Message) -> Option<Message> {
        Self::run(&self.sender_post, "after_send", message, |p, m| p.after_send(m))
    }

    pub fn before_receive(&self, message: Message) -> Option<Message> {
        Self::run(&self.receiver_pre, "before_receive", message, |p, m| {
            p.before_receive(m)
        })
    }

    pub fn after_receive(&self, message: Message) -> Option<Message> {
        Self::run(&self.receiver_post, "after_receive", message, |p, m| {
            p.after_receive(m)
        })
    }

    /// Drive every processor's periodic hook, collecting the messages
    /// they want queued.
    pub fn run_processables(&self, now_millis: i64) -> Vec<Message> {
        let mut out = Vec::new();
        for processor in &self.all {
            out.extend(lock(processor).process(now_millis));
        }
        out
    }

    pub fn fire_on_register(&self, client_id: ClientId) {
        for processor in &self.all {
            lock(processor).on_register(client_id);
        }
    }

    pub fn fire_on_unregister(&self, client_id: ClientId) {
        for processor in &self.all {
            lock(processor).on_unregister(client_id);
        }
    }
}
