//! Segment framing and integrity.
//!
//! Every datagram exchanged between peers is one [`Segment`]: a fixed
//! 32-byte header followed by the payload.  [`Segment::encode`] seals the
//! header with a CRC-32 over the whole datagram (code field zeroed);
//! [`Segment::decode`] refuses anything truncated, mis-sized or failing that
//! check.  Nothing here touches a socket.
//!
//! # Wire format
//!
//! Integers are big-endian (network order).
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |F|S| |A|        Reserved       |           Reserved            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Advertised Window                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Payload Length                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Future Use 0                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Future Use 1                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Checksum                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 32 bytes.  Reserved and future-use
//! fields are written as zero and ignored on receipt.

use crate::checksum::crc32;

/// Bit-flag constants for the 16-bit control field.
pub mod flags {
    /// The acknowledgment number is meaningful.
    pub const ACK: u16 = 1 << 12;
    /// Opens a connection.
    pub const SYN: u16 = 1 << 14;
    /// The sender has finished.
    pub const FIN: u16 = 1 << 15;

    /// Every bit this protocol assigns a meaning to.
    pub const KNOWN: u16 = ACK | SYN | FIN;

    /// `true` when `f` is one of the combinations a protocol step may carry:
    /// none (data), `SYN`, `SYN|ACK`, `ACK`, `FIN` or `FIN|ACK`.
    pub fn is_valid(f: u16) -> bool {
        let c = f & KNOWN;
        c == 0 || c == SYN || c == ACK || c == FIN || c == SYN | ACK || c == FIN | ACK
    }

    /// Human-readable rendering used in log lines and errors.
    pub fn name(f: u16) -> &'static str {
        match f & KNOWN {
            0 => "DATA",
            SYN => "SYN",
            ACK => "ACK",
            FIN => "FIN",
            x if x == SYN | ACK => "SYN|ACK",
            x if x == FIN | ACK => "FIN|ACK",
            _ => "INVALID",
        }
    }
}

/// Serialised header size.
pub const HEADER_LEN: usize = 32;

// Field offsets.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_FLAGS: usize = 8;
const OFF_WINDOW: usize = 12;
const OFF_PAYLOAD_LEN: usize = 16;
const OFF_CHECKSUM: usize = 28;

/// Returns `true` when sequence number `a` is strictly before `b` in
/// wrap-around space.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) <= (u32::MAX / 2)
}

/// Decoded header fields.
///
/// Fields are in host byte order; [`Segment::encode`] converts to big-endian
/// on the wire and [`Segment::decode`] converts back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Position of the first payload byte (or of the control flag).
    pub seq: u32,
    /// Next position expected from the receiver of this segment.
    pub ack: u32,
    /// [`flags`] bits.
    pub flags: u16,
    /// Advertised receive window in bytes.
    pub window: u32,
    /// Payload byte count.
    ///
    /// Recomputed by `encode`.
    pub payload_len: u32,
    /// CRC-32 over the serialised segment with this field zeroed.
    ///
    /// Written last by `encode`.
    /// On decode this is verified before the segment is returned.
    pub checksum: u32,
}

impl Header {
    /// Build a header with the integrity code left at zero.
    pub fn new(seq: u32, ack: u32, flags: u16, window: u32, payload_len: u32) -> Self {
        Self {
            seq,
            ack,
            flags,
            window,
            payload_len,
            checksum: 0,
        }
    }

    /// `true` when every bit in `mask` is set.
    pub fn has(&self, mask: u16) -> bool {
        self.flags & mask == mask
    }

    /// Control bits only, with reserved bits masked off.
    pub fn control(&self) -> u16 {
        self.flags & flags::KNOWN
    }
}

/// Header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Segment {
    /// A payload-less control segment (`SYN`, `ACK`, `FIN`, ...).
    pub fn control(seq: u32, ack: u32, flags: u16, window: u32) -> Self {
        Self {
            header: Header::new(seq, ack, flags, window, 0),
            payload: Vec::new(),
        }
    }

    /// A data segment.  Data segments carry no flags and no window.
    pub fn data(seq: u32, ack: u32, payload: Vec<u8>) -> Self {
        let len = payload.len() as u32;
        Self {
            header: Header::new(seq, ack, 0, 0, len),
            payload,
        }
    }

    /// Sequence number immediately after this segment's payload.
    pub fn end_seq(&self) -> u32 {
        self.header.seq.wrapping_add(self.payload.len() as u32)
    }

    /// Serialise this segment into a newly allocated byte vector.
    ///
    /// The length and integrity fields are always derived from the payload,
    /// whatever the header currently holds.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.encode_unsealed();
        let csum = crc32(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&csum.to_be_bytes());
        buf
    }

    /// Integrity code this segment will carry on the wire.
    pub fn checksum(&self) -> u32 {
        crc32(&self.encode_unsealed())
    }

    /// Serialised form with the checksum field zeroed.
    fn encode_unsealed(&self) -> Vec<u8> {
        let len = self.payload.len();
        let mut buf = vec![0u8; HEADER_LEN + len];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.header.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.header.ack.to_be_bytes());
        buf[OFF_FLAGS..OFF_FLAGS + 2].copy_from_slice(&self.header.flags.to_be_bytes());
        buf[OFF_WINDOW..OFF_WINDOW + 4].copy_from_slice(&self.header.window.to_be_bytes());
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 4]
            .copy_from_slice(&(len as u32).to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse and verify one datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort);
        }

        let seq = read_u32(buf, OFF_SEQ);
        let ack = read_u32(buf, OFF_ACK);
        let flags = u16::from_be_bytes([buf[OFF_FLAGS], buf[OFF_FLAGS + 1]]);
        let window = read_u32(buf, OFF_WINDOW);
        let payload_len = read_u32(buf, OFF_PAYLOAD_LEN);
        let checksum = read_u32(buf, OFF_CHECKSUM);

        if buf.len() - HEADER_LEN != payload_len as usize {
            return Err(PacketError::LengthMismatch);
        }
        if !verify(buf) {
            return Err(PacketError::ChecksumFailed);
        }

        Ok(Segment {
            header: Header {
                seq,
                ack,
                flags,
                window,
                payload_len,
                checksum,
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Recompute the checksum of a serialised segment with its code field
/// zeroed and compare against the stored code.
///
/// Returns `false` for buffers too short to hold a header.
pub fn verify(buf: &[u8]) -> bool {
    if buf.len() < HEADER_LEN {
        return false;
    }
    let stored = read_u32(buf, OFF_CHECKSUM);
    let mut zeroed = buf.to_vec();
    zeroed[OFF_CHECKSUM..OFF_CHECKSUM + 4].fill(0);
    crc32(&zeroed) == stored
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Reasons a datagram is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("buffer too short to contain a header")]
    BufferTooShort,
    #[error("payload_len field does not match remaining bytes")]
    LengthMismatch,
    #[error("checksum verification failed")]
    ChecksumFailed,
}
