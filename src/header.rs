//! Fixed-size wire header stamped in front of every active message.
//!
//! The header occupies exactly one alignment unit so the user payload
//! always starts on a 64-byte boundary regardless of header content.

use crate::handler::HandlerId;

/// Alignment boundary for the payload start.
pub const ALIGNMENT: usize = 64;
/// Header length on the wire; equal to [`ALIGNMENT`] by construction.
pub const HEADER_LEN: usize = ALIGNMENT;

const MAGIC: u32 = 0x524D_4931; // "RMI1"

pub const ATTR_UNORDERED: u32 = 0x0;
pub const ATTR_ORDERED: u32 = 0x1;
/// Header-only announcement of an oversize transfer; `payload_len` carries
/// the true size and no payload follows.
pub const ATTR_HUGE_ANNOUNCE: u32 = 0x2;

/// Per-(source, destination) ordering counter. Fixed width, wraps; a full
/// wrap within one run is tolerated but not proven correct.
pub type Seq = u16;

const SEQ_HALF: Seq = 1 << 15;

/// True when counter `a` precedes counter `b` in wrapping order.
pub fn seq_before(a: Seq, b: Seq) -> bool {
    a != b && b.wrapping_sub(a) < SEQ_HALF
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub handler: HandlerId,
    pub attr: u32,
    pub seq: Seq,
    pub payload_len: u64,
}

impl Header {
    pub fn is_ordered(&self) -> bool {
        self.attr & ATTR_ORDERED != 0
    }

    pub fn is_huge_announce(&self) -> bool {
        self.attr & ATTR_HUGE_ANNOUNCE != 0
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.handler.0.to_le_bytes());
        buf[8..12].copy_from_slice(&self.attr.to_le_bytes());
        buf[12..14].copy_from_slice(&self.seq.to_le_bytes());
        buf[16..24].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Decodes the leading [`HEADER_LEN`] bytes of a received buffer.
    /// Returns `None` on a short buffer or bad magic; the dispatcher treats
    /// that as a fatal condition.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().expect("slice length"));
        if magic != MAGIC {
            return None;
        }
        let handler = u32::from_le_bytes(bytes[4..8].try_into().expect("slice length"));
        let attr = u32::from_le_bytes(bytes[8..12].try_into().expect("slice length"));
        let seq = u16::from_le_bytes(bytes[12..14].try_into().expect("slice length"));
        let payload_len = u64::from_le_bytes(bytes[16..24].try_into().expect("slice length"));
        Some(Self {
            handler: HandlerId(handler),
            attr,
            seq,
            payload_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_fields() {
        let header = Header {
            handler: HandlerId(42),
            attr: ATTR_ORDERED,
            seq: 999,
            payload_len: 123_456,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(Header::from_bytes(&bytes), Some(header));
    }

    #[test]
    fn rejects_bad_magic_and_short_input() {
        let mut bytes = Header {
            handler: HandlerId(1),
            attr: ATTR_UNORDERED,
            seq: 0,
            payload_len: 8,
        }
        .to_bytes();
        assert!(Header::from_bytes(&bytes[..HEADER_LEN - 1]).is_none());
        bytes[0] ^= 0xFF;
        assert!(Header::from_bytes(&bytes).is_none());
    }

    #[test]
    fn attribute_bits() {
        let ordered = Header {
            handler: HandlerId(0),
            attr: ATTR_ORDERED,
            seq: 1,
            payload_len: 0,
        };
        assert!(ordered.is_ordered());
        assert!(!ordered.is_huge_announce());

        let announce = Header {
            handler: HandlerId(0),
            attr: ATTR_HUGE_ANNOUNCE,
            seq: 0,
            payload_len: 10 << 20,
        };
        assert!(announce.is_huge_announce());
        assert!(!announce.is_ordered());
    }

    #[test]
    fn seq_comparison_handles_wrap() {
        assert!(seq_before(1, 2));
        assert!(!seq_before(2, 1));
        assert!(!seq_before(5, 5));
        // Across the wrap point the newer counter still compares later.
        assert!(seq_before(u16::MAX, 0));
        assert!(!seq_before(0, u16::MAX));
    }
}
