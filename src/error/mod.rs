use std::io;
use thiserror::Error;

use crate::protocol::ClientId;

/// Errors that may occur while encoding a message into its wire payload.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Message payload missing, create_payload was not run.")]
    MissingPayload,
    #[error("Part body exceeds the configured maximum packet size.")]
    PartTooLarge,
}

/// Errors that may occur while decoding a datagram into a message.
///
/// This type is kept small and generic so it can be shared by all
/// `Wire` implementations and message bodies.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The buffer did not contain enough bytes to decode the requested value.
    #[error("Unexpected EoF, not enough bytes to read requested type.")]
    UnexpectedEof,

    /// A message kind tag was not recognised.
    #[error("Unknown message kind tag: {0}")]
    UnknownKind(u8),

    /// A reliable mode value that does not map to any known variant.
    #[error("Unknown reliable mode byte: {0}")]
    UnknownReliableMode(u8),

    /// Flag bits outside the defined set were present.
    #[error("Invalid message flag bits: {0:#04x}")]
    InvalidFlags(u8),

    /// A part header announced more parts than allowed.
    #[error("Part count {0} exceeds maximum supported parts.")]
    PartCountTooLarge(u32),

    /// A part index pointed outside its announced group.
    #[error("Part index out of range.")]
    PartIndexOutOfRange,

    /// Reassembly state for too many message groups at once.
    #[error("Part reassembly buffer full.")]
    PartBufferFull,

    /// A part arrived whose group was opened with a different part count.
    #[error("Part count didn't match the existing reassembly group.")]
    PartCountMismatch,
}

/// Verdict of a failed send pipeline run.
///
/// Every failure disposition the pipeline knows is a variant here; the
/// pipeline has already logged at the appropriate severity by the time
/// the caller sees one of these, so matching on the variant is enough.
#[derive(Error, Debug)]
pub enum SendError {
    /// Payload encoding failed; nothing was transmitted and no ID was
    /// stepped back (the ID stage runs before the payload stage).
    #[error("Payload creation failed.")]
    Encoding(#[from] EncodeError),

    /// The encoded payload was oversize, auto-split was on, and the
    /// message was replaced by `parts` queued fragments. The original
    /// was not sent as-is.
    #[error("Oversize message split into {parts} queued parts.")]
    OversizeSplit { parts: usize },

    /// The encoded payload was oversize and could not be split.
    #[error("Payload of {size} bytes exceeds maximum packet size of {max}.")]
    Oversize { size: usize, max: usize },

    /// A processor returned `None` and discarded the message.
    #[error("Message discarded by a processor at {stage}.")]
    Discarded { stage: &'static str },

    /// Direct send to a client ID with no registry entry.
    #[error("Client with id {0} not found.")]
    UnknownReceiver(ClientId),
}

/// Crate-level umbrella error.
#[derive(Error, Debug)]
pub enum RelnetError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    #[error("Transport is not started.")]
    NotStarted,
}
