//! Message model, delivery modes, and the wire codec used by the
//! bundled transport driver.

pub mod constants;
pub mod message;
pub mod reliability;
pub mod wire;

pub use message::{
    ClientId, FeatureFlags, Message, MessageBody, MessageFeatures, MessageFlags, MessageId,
    MessageKind,
};
pub use reliability::ReliableMode;
pub use wire::Wire;
