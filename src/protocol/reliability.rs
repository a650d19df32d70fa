use crate::error::DecodeError;

/// Delivery guarantee attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReliableMode {
    /// Fire-and-forget.
    #[default]
    Unreliable,
    /// Ordered by ID, duplicates dropped, gaps tolerated.
    SequenceNumber,
    /// Retransmitted until acknowledged.
    AckPacket,
}

impl ReliableMode {
    /// Anything that is not fire-and-forget.
    pub fn is_reliable(&self) -> bool {
        !matches!(self, ReliableMode::Unreliable)
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ReliableMode::Unreliable => 0,
            ReliableMode::SequenceNumber => 1,
            ReliableMode::AckPacket => 2,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self, DecodeError> {
        match b {
            0 => Ok(ReliableMode::Unreliable),
            1 => Ok(ReliableMode::SequenceNumber),
            2 => Ok(ReliableMode::AckPacket),
            other => Err(DecodeError::UnknownReliableMode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip() {
        for mode in [
            ReliableMode::Unreliable,
            ReliableMode::SequenceNumber,
            ReliableMode::AckPacket,
        ] {
            assert_eq!(ReliableMode::from_byte(mode.to_byte()).unwrap(), mode);
        }
    }

    #[test]
    fn rejects_unknown_byte() {
        assert!(matches!(
            ReliableMode::from_byte(7),
            Err(DecodeError::UnknownReliableMode(7))
        ));
    }
}
