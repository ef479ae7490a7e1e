//! # URP Wire Format
//!
//! Fixed 6-byte segment header followed by up to [`MSS`] payload bytes.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Sequence Number (16)     |   Flags: F S A + reserved     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Checksum (16)         |       Payload (0..MSS)        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The checksum is the 16-bit one's-complement sum of the whole segment with
//! the checksum field zeroed; an odd trailing byte pads with a zero low byte.
//! Segment types are one-hot flag bits: ACK `0x2000`, SYN `0x4000`,
//! FIN `0x8000`; DATA sets none.

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use rand::RngExt;
use std::fmt;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Maximum Segment Size — largest payload in one DATA segment (bytes).
pub const MSS: usize = 1000;

/// Fixed header size: seq (2) + flags (2) + checksum (2).
pub const HEADER_SIZE: usize = 6;

/// Largest segment on the wire: header + MSS.
pub const MAX_SEGMENT_SIZE: usize = HEADER_SIZE + MSS;

/// ACK flag bit (bit 13).
pub const FLAG_ACK: u16 = 0x2000;
/// SYN flag bit (bit 14).
pub const FLAG_SYN: u16 = 0x4000;
/// FIN flag bit (bit 15).
pub const FLAG_FIN: u16 = 0x8000;

// ─── Segment Kind ────────────────────────────────────────────────────────────

/// The four segment types carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Data,
    Ack,
    Syn,
    Fin,
}

impl SegmentKind {
    /// Flag bits for this kind (DATA sets none).
    pub fn flags(self) -> u16 {
        match self {
            SegmentKind::Data => 0,
            SegmentKind::Ack => FLAG_ACK,
            SegmentKind::Syn => FLAG_SYN,
            SegmentKind::Fin => FLAG_FIN,
        }
    }

    /// Classify a flags field. ACK is matched before SYN before FIN; a field
    /// with none of the three bits is DATA.
    pub fn from_flags(flags: u16) -> Self {
        if flags & FLAG_ACK != 0 {
            SegmentKind::Ack
        } else if flags & FLAG_SYN != 0 {
            SegmentKind::Syn
        } else if flags & FLAG_FIN != 0 {
            SegmentKind::Fin
        } else {
            SegmentKind::Data
        }
    }

    /// Wire-log name, always four characters or fewer.
    pub fn name(self) -> &'static str {
        match self {
            SegmentKind::Data => "DATA",
            SegmentKind::Ack => "ACK",
            SegmentKind::Syn => "SYN",
            SegmentKind::Fin => "FIN",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Checksum ────────────────────────────────────────────────────────────────

/// 16-bit one's-complement checksum over `data`.
///
/// The buffer is summed as big-endian 16-bit words; an odd final byte forms
/// the high byte of a zero-padded word. Carries are folded back into the low
/// 16 bits and the result is complemented.
pub fn checksum(data: &[u8]) -> u16 {
    let mut acc: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        acc += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = chunks.remainder() {
        acc += u32::from(*last) << 8;
    }
    while acc >> 16 != 0 {
        acc = (acc & 0xFFFF) + (acc >> 16);
    }
    !(acc as u16)
}

// ─── Segment ─────────────────────────────────────────────────────────────────

/// A decoded (or to-be-encoded) URP segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 16-bit wire sequence number. For DATA this is the byte offset of the
    /// first payload byte in the stream (mod 2^16); SYN and FIN occupy one
    /// sequence number; for ACK it is the next expected receiver sequence.
    pub seq: u16,
    pub kind: SegmentKind,
    /// Present only for DATA.
    pub payload: Bytes,
}

impl Segment {
    pub fn data(seq: u16, payload: Bytes) -> Self {
        Segment {
            seq,
            kind: SegmentKind::Data,
            payload,
        }
    }

    pub fn ack(seq: u16) -> Self {
        Segment {
            seq,
            kind: SegmentKind::Ack,
            payload: Bytes::new(),
        }
    }

    pub fn syn(seq: u16) -> Self {
        Segment {
            seq,
            kind: SegmentKind::Syn,
            payload: Bytes::new(),
        }
    }

    pub fn fin(seq: u16) -> Self {
        Segment {
            seq,
            kind: SegmentKind::Fin,
            payload: Bytes::new(),
        }
    }

    /// Serialize header + payload, computing the checksum over the segment
    /// with the checksum field zeroed.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u16(self.seq);
        buf.put_u16(self.kind.flags());
        buf.put_u16(0);
        buf.extend_from_slice(&self.payload);

        let cksum = checksum(&buf);
        buf[4..6].copy_from_slice(&cksum.to_be_bytes());
        buf.freeze()
    }

    /// Decode a raw datagram. Returns `None` for malformed input (< 6 bytes);
    /// otherwise the segment plus whether its checksum verified.
    pub fn decode(raw: &[u8]) -> Option<(Segment, bool)> {
        if raw.len() < HEADER_SIZE {
            return None;
        }

        let seq = u16::from_be_bytes([raw[0], raw[1]]);
        let flags = u16::from_be_bytes([raw[2], raw[3]]);
        let received = u16::from_be_bytes([raw[4], raw[5]]);
        let payload = Bytes::copy_from_slice(&raw[HEADER_SIZE..]);

        // Recompute with the checksum field zeroed.
        let mut scratch = BytesMut::with_capacity(raw.len());
        scratch.extend_from_slice(&raw[..4]);
        scratch.put_u16(0);
        scratch.extend_from_slice(&payload);
        let valid = checksum(&scratch) == received;

        Some((
            Segment {
                seq,
                kind: SegmentKind::from_flags(flags),
                payload,
            },
            valid,
        ))
    }
}

// ─── Corruption Primitive ────────────────────────────────────────────────────

/// Flip a single random bit of `raw`, in a byte at position ≥ 4 so the seq
/// and flags fields survive. If the input is 4 bytes or shorter, any byte is
/// eligible. The result differs from the input in exactly one bit.
pub fn corrupt(raw: &[u8], rng: &mut impl Rng) -> Bytes {
    let mut bytes = raw.to_vec();
    let byte_idx = if bytes.len() <= 4 {
        rng.random_range(0..bytes.len())
    } else {
        rng.random_range(4..bytes.len())
    };
    let bit_idx = rng.random_range(0..8);
    bytes[byte_idx] ^= 1 << bit_idx;
    Bytes::from(bytes)
}

// ─── Sequence Unwrapping ─────────────────────────────────────────────────────

/// Reconstruct the 64-bit stream position of a 16-bit wire sequence number
/// by picking the representative nearest to `reference`.
///
/// Unambiguous while the live sequence span stays under half the 16-bit
/// space, which the `max_win < 32768` bound guarantees.
pub fn unwrap_seq(wire: u16, reference: u64) -> u64 {
    let delta = wire.wrapping_sub(reference as u16) as i16;
    reference.checked_add_signed(i64::from(delta)).unwrap_or(0)
}
