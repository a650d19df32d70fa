//! Shared protocol-level constants and defaults.
//!
//! These values are part of the wire-level contract between peers and
//! should not be changed independently on the two sides of a link.

use std::time::Duration;

/// Fixed number of bytes reserved for a part message's own framing when
/// an oversize payload is split. Chunks are sized to
/// `maximum_udp_packet_size - PART_HEADER_SIZE` so a part never exceeds
/// the datagram cap its parent violated.
pub const PART_HEADER_SIZE: usize = 40;

const _: () = {
    assert!(
        PART_HEADER_SIZE >= WIRE_HEADER_SIZE + PART_BODY_HEADER_SIZE,
        "PART_HEADER_SIZE must cover the encoded part framing"
    );
};

/// Encoded size of the common message header:
/// `msg_id u64 | sender u32 | receiver u32 | mode u8 | flags u8 |
/// features u8 | kind u8`.
pub const WIRE_HEADER_SIZE: usize = 20;

/// Encoded size of the part-specific body prefix:
/// `parent_id u64 | index u32 | count u32 | len u32`.
pub const PART_BODY_HEADER_SIZE: usize = 20;

/// Default hard cap on a single datagram payload, in bytes.
pub const DEFAULT_MAX_UDP_PACKET_SIZE: usize = 1200;

/// Default minimum gap between paced queue dequeues.
pub const DEFAULT_QUEUED_MESSAGES_DELAY_MS: i64 = 50;

/// Default server heartbeat cadence.
pub const DEFAULT_KEEP_ALIVE_INTERVAL_MS: i64 = 1_000;

/// Default silent-client timeout.
pub const DEFAULT_TIMEOUT_THRESHOLD_MS: i64 = 10_000;

/// Default dedup window for repeated connect requests from one client.
pub const DEFAULT_TIME_SINCE_LAST_CONNECT_REQUEST_MS: i64 = 1_000;

/// Default interval between resends of unacked reliable messages.
pub const DEFAULT_RESEND_INTERVAL_MS: i64 = 250;

/// Default number of resend attempts before an unacked reliable message
/// is surfaced as exhausted.
pub const DEFAULT_MAX_RESENDS: u32 = 16;

/// Default TTL for incomplete part reassembly groups.
pub const DEFAULT_PART_TIMEOUT: Duration = Duration::from_secs(30);

/// Most parts a single oversize message may be split into. Anything
/// larger is rejected on both the split and reassembly sides.
pub const MAX_MESSAGE_PARTS: u32 = 8192;

/// Most part groups a receiver will reassemble concurrently.
pub const MAX_CONCURRENT_PART_GROUPS: usize = 256;
