//! Compact big-endian wire codec used by the default transport driver.
//!
//! The pipeline core never touches these bytes; it only dictates that a
//! message carries its IDs and feature flags. The layout here is the
//! contract of the bundled UDP driver: a fixed header followed by a
//! kind-specific body, one message per datagram.

use std::collections::BTreeSet;

use bytes::{Buf, BufMut, Bytes};

use crate::error::{DecodeError, EncodeError};
use crate::protocol::constants::MAX_MESSAGE_PARTS;
use crate::protocol::message::{
    FeatureFlags, Message, MessageBody, MessageFeatures, MessageFlags,
};
use crate::protocol::reliability::ReliableMode;

/// Trait for values that know how to encode/decode themselves using
/// this crate's wire format.
pub trait Wire: Sized {
    /// Encode this value into the destination buffer.
    fn encode_wire(&self, dst: &mut impl BufMut) -> Result<(), EncodeError>;

    /// Decode a value of this type from the source buffer.
    fn decode_wire(src: &mut impl Buf) -> Result<Self, DecodeError>;
}

macro_rules! int_wire {
    ($ty:ty, $put:ident, $get:ident, $width:expr) => {
        impl Wire for $ty {
            fn encode_wire(&self, dst: &mut impl BufMut) -> Result<(), EncodeError> {
                dst.$put(*self);
                Ok(())
            }

            fn decode_wire(src: &mut impl Buf) -> Result<Self, DecodeError> {
                if src.remaining() < $width {
                    return Err(DecodeError::UnexpectedEof);
                }
                Ok(src.$get())
            }
        }
    };
}

int_wire!(u8, put_u8, get_u8, 1);
int_wire!(u16, put_u16, get_u16, 2);
int_wire!(u32, put_u32, get_u32, 4);
int_wire!(u64, put_u64, get_u64, 8);

fn decode_bytes(src: &mut impl Buf) -> Result<Bytes, DecodeError> {
    let len = u32::decode_wire(src)? as usize;
    if src.remaining() < len {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(src.copy_to_bytes(len))
}

fn encode_bytes(bytes: &Bytes, dst: &mut impl BufMut) -> Result<(), EncodeError> {
    (bytes.len() as u32).encode_wire(dst)?;
    dst.put_slice(bytes);
    Ok(())
}

// Kind tags. Part of the wire contract, append-only.
const KIND_APP: u8 = 0;
const KIND_PART: u8 = 1;
const KIND_ACK: u8 = 2;
const KIND_CONNECT_REQUEST: u8 = 3;
const KIND_LEAVE_REQUEST: u8 = 4;
const KIND_KEEP_ALIVE: u8 = 5;

fn kind_tag(body: &MessageBody) -> u8 {
    match body {
        MessageBody::App(_) => KIND_APP,
        MessageBody::Part { .. } => KIND_PART,
        MessageBody::Ack { .. } => KIND_ACK,
        MessageBody::ConnectRequest { .. } => KIND_CONNECT_REQUEST,
        MessageBody::LeaveRequest => KIND_LEAVE_REQUEST,
        MessageBody::KeepAlive => KIND_KEEP_ALIVE,
    }
}

impl Wire for Message {
    fn encode_wire(&self, dst: &mut impl BufMut) -> Result<(), EncodeError> {
        self.msg_id().encode_wire(dst)?;
        self.sender_id().encode_wire(dst)?;
        self.receiver_id().encode_wire(dst)?;
        self.reliable_mode().to_byte().encode_wire(dst)?;
        self.flags().bits().encode_wire(dst)?;
        self.features().flags().bits().encode_wire(dst)?;
        kind_tag(self.body()).encode_wire(dst)?;

        match self.body() {
            MessageBody::App(bytes) => encode_bytes(bytes, dst)?,
            MessageBody::Part {
                parent_id,
                index,
                count,
                bytes,
            } => {
                parent_id.encode_wire(dst)?;
                index.encode_wire(dst)?;
                count.encode_wire(dst)?;
                encode_bytes(bytes, dst)?;
            }
            MessageBody::Ack { ids } => {
                (ids.len() as u16).encode_wire(dst)?;
                for id in ids {
                    id.encode_wire(dst)?;
                }
            }
            MessageBody::ConnectRequest { client_id } => client_id.encode_wire(dst)?,
            MessageBody::LeaveRequest | MessageBody::KeepAlive => {}
        }
        Ok(())
    }

    fn decode_wire(src: &mut impl Buf) -> Result<Self, DecodeError> {
        let msg_id = u64::decode_wire(src)?;
        let sender_id = u32::decode_wire(src)?;
        let receiver_id = u32::decode_wire(src)?;
        let mode = ReliableMode::from_byte(u8::decode_wire(src)?)?;
        let flag_bits = u8::decode_wire(src)?;
        let flags = MessageFlags::from_bits(flag_bits).ok_or(DecodeError::InvalidFlags(flag_bits))?;
        let feature_bits = u8::decode_wire(src)?;
        let features =
            FeatureFlags::from_bits(feature_bits).ok_or(DecodeError::InvalidFlags(feature_bits))?;
        let kind = u8::decode_wire(src)?;

        let mut message = match kind {
            KIND_APP => Message::app(decode_bytes(src)?, mode),
            KIND_PART => {
                let parent_id = u64::decode_wire(src)?;
                let index = u32::decode_wire(src)?;
                let count = u32::decode_wire(src)?;
                if count == 0 || count > MAX_MESSAGE_PARTS {
                    return Err(DecodeError::PartCountTooLarge(count));
                }
                if index >= count {
                    return Err(DecodeError::PartIndexOutOfRange);
                }
                Message::part(parent_id, index, count, decode_bytes(src)?, mode)
            }
            KIND_ACK => {
                let count = u16::decode_wire(src)?;
                let mut ids = BTreeSet::new();
                for _ in 0..count {
                    ids.insert(u64::decode_wire(src)?);
                }
                Message::ack(ids)
            }
            KIND_CONNECT_REQUEST => Message::connect_request(u32::decode_wire(src)?),
            KIND_LEAVE_REQUEST => Message::leave_request(),
            KIND_KEEP_ALIVE => Message::keep_alive(),
            other => return Err(DecodeError::UnknownKind(other)),
        };

        message.set_msg_id(msg_id);
        message.set_sender_id(sender_id);
        message.set_receiver_id(receiver_id);
        message.set_flags(flags);
        message.set_features(MessageFeatures::new(features));
        Ok(message)
    }
}
