//! Binary streaming protocol emitted by the capture service.
//!
//! # Frame layout (17-byte header, little-endian)
//!
//! ```text
//! [0]      frame type    u8      0x01 append-preview
//!                                0x81 insert-at-top preview
//!                                0x02 realtime-tail
//! [1..5]   width         u32 LE  image width in pixels
//! [5..9]   total_height  u32 LE  total composite height reported so far
//! [9..13]  start_row     u32 LE  first row this frame covers
//! [13..17] send_height   u32 LE  number of rows in this frame
//! [17..]   payload       [u8]    raw RGBA row-major, width × send_height × 4
//! ```
//!
//! One message per frame; the header fully determines the payload length, so
//! concatenated messages (recorded streams) are self-delimiting. A realtime-tail
//! frame with `width == 0` or `send_height == 0` means "clear the pending tail".

use bytes::Bytes;
use longshot_core::ProtocolError;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 17;

const TYPE_APPEND: u8 = 0x01;
const TYPE_INSERT_TOP: u8 = 0x81;
const TYPE_TAIL: u8 = 0x02;

// ── FrameType ─────────────────────────────────────────────────────────────────

/// Stitching direction / role of a streamed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Rows land at `start_row`, extending or patching the composite downward.
    AppendPreview,
    /// Rows logically precede everything captured so far; existing content shifts down.
    InsertTopPreview,
    /// Uncommitted live tail, held outside the accumulation buffer.
    RealtimeTail,
}

impl FrameType {
    fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            TYPE_APPEND => Ok(Self::AppendPreview),
            TYPE_INSERT_TOP => Ok(Self::InsertTopPreview),
            TYPE_TAIL => Ok(Self::RealtimeTail),
            other => Err(ProtocolError::UnknownFrameType { type_byte: other }),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::AppendPreview => TYPE_APPEND,
            Self::InsertTopPreview => TYPE_INSERT_TOP,
            Self::RealtimeTail => TYPE_TAIL,
        }
    }
}

// ── FrameHeader ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub width: u32,
    pub total_height: u32,
    pub start_row: u32,
    pub send_height: u32,
}

impl FrameHeader {
    /// Payload length this header promises.
    pub fn payload_len(&self) -> usize {
        self.width as usize * self.send_height as usize * 4
    }

    /// Total wire size of the message (header + payload).
    pub fn message_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    /// A zero-size realtime-tail frame clears the pending tail slot.
    pub fn is_tail_clear(&self) -> bool {
        self.frame_type == FrameType::RealtimeTail && (self.width == 0 || self.send_height == 0)
    }

    /// Parse one message. Returns the header and a zero-copy slice of its
    /// payload; trailing bytes (the next message in a recorded stream) are
    /// left for the caller.
    pub fn parse(message: &Bytes) -> Result<(FrameHeader, Bytes), ProtocolError> {
        if message.len() < HEADER_SIZE {
            return Err(ProtocolError::MalformedFrame { len: message.len(), header: HEADER_SIZE });
        }

        let header = FrameHeader {
            frame_type: FrameType::from_byte(message[0])?,
            width: u32::from_le_bytes(message[1..5].try_into().unwrap()),
            total_height: u32::from_le_bytes(message[5..9].try_into().unwrap()),
            start_row: u32::from_le_bytes(message[9..13].try_into().unwrap()),
            send_height: u32::from_le_bytes(message[13..17].try_into().unwrap()),
        };

        let expected = header.payload_len();
        let available = message.len() - HEADER_SIZE;
        if available < expected {
            return Err(ProtocolError::PayloadTruncated { expected, actual: available });
        }

        let payload = message.slice(HEADER_SIZE..HEADER_SIZE + expected);
        Ok((header, payload))
    }

    /// Exact inverse of [`FrameHeader::parse`], used by tests and by the
    /// replay tooling to author recorded streams.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        debug_assert_eq!(payload.len(), self.payload_len());
        let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
        message.push(self.frame_type.to_byte());
        message.extend_from_slice(&self.width.to_le_bytes());
        message.extend_from_slice(&self.total_height.to_le_bytes());
        message.extend_from_slice(&self.start_row.to_le_bytes());
        message.extend_from_slice(&self.send_height.to_le_bytes());
        message.extend_from_slice(payload);
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use longshot_core::ProtocolError;

    fn header(frame_type: FrameType, width: u32, send_height: u32) -> FrameHeader {
        FrameHeader { frame_type, width, total_height: 1000, start_row: 20, send_height }
    }

    #[test]
    fn encode_parse_round_trip() {
        let h = header(FrameType::AppendPreview, 3, 2);
        let payload: Vec<u8> = (0..h.payload_len() as u32).map(|i| i as u8).collect();
        let wire = Bytes::from(h.encode(&payload));

        let (parsed, body) = FrameHeader::parse(&wire).expect("well-formed frame");
        assert_eq!(parsed, h);
        assert_eq!(&body[..], &payload[..]);
    }

    #[test]
    fn insert_top_type_byte_is_0x81() {
        let h = header(FrameType::InsertTopPreview, 1, 1);
        let wire = h.encode(&[0; 4]);
        assert_eq!(wire[0], 0x81);
    }

    #[test]
    fn short_input_is_malformed() {
        let wire = Bytes::from_static(&[0x01, 0x00, 0x00]);
        assert!(matches!(
            FrameHeader::parse(&wire),
            Err(ProtocolError::MalformedFrame { len: 3, .. })
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let h = header(FrameType::AppendPreview, 4, 4);
        let mut wire = h.encode(&vec![0xAB; h.payload_len()]);
        wire.truncate(HEADER_SIZE + 10);
        assert!(matches!(
            FrameHeader::parse(&Bytes::from(wire)),
            Err(ProtocolError::PayloadTruncated { expected: 64, actual: 10 })
        ));
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        let mut wire = header(FrameType::AppendPreview, 1, 1).encode(&[0; 4]);
        wire[0] = 0x7F;
        assert!(matches!(
            FrameHeader::parse(&Bytes::from(wire)),
            Err(ProtocolError::UnknownFrameType { type_byte: 0x7F })
        ));
    }

    #[test]
    fn zero_size_tail_is_a_clear() {
        let h = FrameHeader {
            frame_type: FrameType::RealtimeTail,
            width: 0,
            total_height: 0,
            start_row: 0,
            send_height: 0,
        };
        assert!(h.is_tail_clear());
        assert!(!header(FrameType::AppendPreview, 0, 0).is_tail_clear());
    }
}
