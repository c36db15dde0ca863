//! Wire-format definitions for protocol packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (type tag, sequence number, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for malformed or truncated input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Layout
//!
//! ```text
//! offset  size  field
//!   0      1    type       (0 = DATA, 1 = ACK)
//!   1      2    seqNum     (big-endian, unsigned 16-bit)
//!   3      N    payload    (US-ASCII, N ≤ 1397)
//! ```
//!
//! A whole packet fits in a single 1400-byte UDP datagram.  ACK packets carry
//! no payload and are always exactly [`HEADER_LEN`] bytes.

use std::fmt;

use thiserror::Error;

/// Largest datagram the protocol ever puts on the wire.
pub const MAX_DATAGRAM: usize = 1400;

/// Fixed header size: one type byte plus a big-endian u16 sequence number.
pub const HEADER_LEN: usize = 3;

/// Largest payload that still fits a [`MAX_DATAGRAM`]-sized packet.
pub const MAX_PAYLOAD: usize = MAX_DATAGRAM - HEADER_LEN;

// ---------------------------------------------------------------------------
// Packet type
// ---------------------------------------------------------------------------

/// Wire tag distinguishing data packets from acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Carries an application payload.
    Data,
    /// Acknowledges one data packet; never carries a payload.
    Ack,
}

impl PacketType {
    /// Parse the one-octet wire tag.  Any value other than 0 or 1 is invalid.
    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PacketType::Data),
            1 => Some(PacketType::Ack),
            _ => None,
        }
    }

    /// The one-octet wire tag for this type.
    pub fn to_wire(self) -> u8 {
        match self {
            PacketType::Data => 0,
            PacketType::Ack => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A complete protocol datagram: type tag, sequence number, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    /// Sequence number in `[0, 2·wSize)`; at most 15 bits are ever used.
    pub seq: u16,
    /// US-ASCII application payload; empty for ACK packets.
    pub payload: String,
}

impl Packet {
    /// Build a DATA packet carrying `payload`.
    pub fn data(seq: u16, payload: String) -> Self {
        Self {
            kind: PacketType::Data,
            seq,
            payload,
        }
    }

    /// Build the ACK for the data packet with sequence number `seq`.
    pub fn ack(seq: u16) -> Self {
        Self {
            kind: PacketType::Ack,
            seq,
            payload: String::new(),
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// Refuses payloads longer than [`MAX_PAYLOAD`] bytes or containing
    /// non-ASCII characters.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge(self.payload.len()));
        }
        if !self.payload.is_ascii() {
            return Err(PacketError::NotAscii);
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.kind.to_wire());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(self.payload.as_bytes());
        Ok(buf)
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Returns `Err` if the buffer is shorter than the header, the type tag
    /// is unknown, or the payload is not US-ASCII.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }
        let kind = PacketType::from_wire(buf[0]).ok_or(PacketError::UnknownType(buf[0]))?;
        let seq = u16::from_be_bytes([buf[1], buf[2]]);
        let body = &buf[HEADER_LEN..];
        if !body.is_ascii() {
            return Err(PacketError::NotAscii);
        }
        let payload = std::str::from_utf8(body)
            .map_err(|_| PacketError::NotAscii)?
            .to_owned();
        Ok(Self { kind, seq, payload })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PacketType::Data => write!(f, "data[{}] {}", self.seq, self.payload),
            PacketType::Ack => write!(f, "ack[{}]", self.seq),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise when encoding or parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Payload would not fit a 1400-byte datagram.
    #[error("payload of {0} bytes exceeds the 1397-byte limit")]
    PayloadTooLarge(usize),
    /// Payload contains non-ASCII characters.
    #[error("payload is not US-ASCII")]
    NotAscii,
    /// Buffer shorter than the fixed header size.
    #[error("buffer of {0} bytes is shorter than the 3-byte header")]
    BufferTooShort(usize),
    /// The one-octet type tag is neither DATA nor ACK.
    #[error("unknown packet type tag {0}")]
    UnknownType(u8),
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_roundtrip() {
        let p = Packet::data(513, "testing 7".to_string());
        let bytes = p.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 9);
        assert_eq!(Packet::decode(&bytes).unwrap(), p);
    }

    #[test]
    fn ack_is_exactly_three_bytes() {
        let p = Packet::ack(7);
        let bytes = p.encode().unwrap();
        assert_eq!(bytes, vec![1, 0, 7]);
        assert_eq!(Packet::decode(&bytes).unwrap(), p);
    }

    #[test]
    fn seq_is_big_endian_on_the_wire() {
        let bytes = Packet::data(0x0102, String::new()).encode().unwrap();
        assert_eq!(&bytes[..HEADER_LEN], &[0, 0x01, 0x02]);
    }

    #[test]
    fn empty_payload_roundtrip() {
        let p = Packet::data(0, String::new());
        assert_eq!(Packet::decode(&p.encode().unwrap()).unwrap(), p);
    }

    #[test]
    fn max_payload_accepted_one_more_refused() {
        let fit = Packet::data(0, "x".repeat(MAX_PAYLOAD));
        assert_eq!(fit.encode().unwrap().len(), MAX_DATAGRAM);

        let too_big = Packet::data(0, "x".repeat(MAX_PAYLOAD + 1));
        assert_eq!(
            too_big.encode(),
            Err(PacketError::PayloadTooLarge(MAX_PAYLOAD + 1))
        );
    }

    #[test]
    fn non_ascii_payload_refused() {
        let p = Packet::data(0, "héllo".to_string());
        assert_eq!(p.encode(), Err(PacketError::NotAscii));
    }

    #[test]
    fn decode_short_buffer_refused() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::BufferTooShort(0)));
        assert_eq!(Packet::decode(&[0, 0]), Err(PacketError::BufferTooShort(2)));
    }

    #[test]
    fn decode_unknown_type_refused() {
        assert_eq!(
            Packet::decode(&[2, 0, 0]),
            Err(PacketError::UnknownType(2))
        );
    }

    #[test]
    fn decode_non_ascii_body_refused() {
        assert_eq!(Packet::decode(&[0, 0, 0, 0xff]), Err(PacketError::NotAscii));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Packet::data(3, "hi".into()).to_string(), "data[3] hi");
        assert_eq!(Packet::ack(3).to_string(), "ack[3]");
    }
}
