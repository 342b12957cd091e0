//! # Wire Framing
//!
//! Every message on a peer stream is a fixed 26-byte header followed by an
//! opaque payload (expected to parse as one tuple):
//!
//! ```text
//! offset  size  field
//!      0     4  magic — big-endian 0x54524A54 ("TRJT")
//!      4     4  payload length — big-endian u32
//!      8    16  GUID — four big-endian u32 words
//!     24     2  message type — big-endian u16
//! ```
//!
//! A GUID of all zeros marks a unicast; any other value marks a gossip
//! broadcast that must be reflected to all other peers exactly once.
//!
//! The decoder is incremental: feed it whatever the socket produced and
//! pull complete frames out. It scans for the magic, discards garbage
//! prefixes, waits for partial frames, and splices consumed bytes away.

use bytes::{Buf, Bytes, BytesMut};

use crate::config::{FRAME_HEADER_LEN, WIRE_MAGIC};

/// Upper bound on a frame payload. The protocol never ships anything
/// close to this; a larger declared length is treated as stream garbage
/// rather than an invitation to buffer gigabytes.
const MAX_PAYLOAD_LEN: usize = 32 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Guid
// ---------------------------------------------------------------------------

/// A 128-bit gossip identifier, used solely for flood suppression.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid([u8; 16]);

impl Guid {
    /// The all-zero GUID: marks a unicast frame.
    pub const NULL: Guid = Guid([0u8; 16]);

    /// A fresh random GUID for a broadcast.
    pub fn random() -> Self {
        Guid(rand::random())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Guid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        *self == Guid::NULL
    }
}

impl std::fmt::Debug for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Guid({})", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Typed wire messages. `Connect`/`Disconnect` events exist only locally
/// and never appear in a frame, which is why the codes start at 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    Handshake = 2,
    PeersRequest = 3,
    PeersResponse = 4,
    BlocksRequest = 5,
    BlocksResponse = 6,
    PoolRequest = 7,
    PoolResponse = 8,
    Block = 9,
    Transaction = 10,
}

impl MessageType {
    pub fn from_u16(code: u16) -> Option<MessageType> {
        match code {
            2 => Some(Self::Handshake),
            3 => Some(Self::PeersRequest),
            4 => Some(Self::PeersResponse),
            5 => Some(Self::BlocksRequest),
            6 => Some(Self::BlocksResponse),
            7 => Some(Self::PoolRequest),
            8 => Some(Self::PoolResponse),
            9 => Some(Self::Block),
            10 => Some(Self::Transaction),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub guid: Guid,
    pub msg_type: MessageType,
    pub payload: Bytes,
}

/// Serialize a frame: the single place header layout is written.
pub fn encode_frame(guid: &Guid, msg_type: MessageType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&WIRE_MAGIC.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(guid.as_bytes());
    out.extend_from_slice(&(msg_type as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

/// Per-peer framing state machine over an append-only receive buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes currently buffered (for tests and diagnostics).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pull the next complete frame, if the buffer holds one.
    ///
    /// Frames with an unrecognized message type or an absurd declared
    /// length are consumed and skipped — the scan then resumes, so one
    /// corrupt frame cannot wedge the stream.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            self.discard_to_magic();

            if self.buf.len() < FRAME_HEADER_LEN {
                return None;
            }

            let length = u32::from_be_bytes(self.buf[4..8].try_into().expect("4 bytes")) as usize;
            if length > MAX_PAYLOAD_LEN {
                // Treat as garbage: skip this magic and rescan.
                self.buf.advance(4);
                continue;
            }
            if self.buf.len() < FRAME_HEADER_LEN + length {
                return None;
            }

            let mut guid_bytes = [0u8; 16];
            guid_bytes.copy_from_slice(&self.buf[8..24]);
            let guid = Guid::from_bytes(guid_bytes);
            let code = u16::from_be_bytes(self.buf[24..26].try_into().expect("2 bytes"));

            // Splice the whole frame out of the buffer before deciding
            // whether the type is one we understand.
            let mut frame = self.buf.split_to(FRAME_HEADER_LEN + length);
            frame.advance(FRAME_HEADER_LEN);
            let payload = frame.freeze();

            match MessageType::from_u16(code) {
                Some(msg_type) => {
                    return Some(Frame {
                        guid,
                        msg_type,
                        payload,
                    })
                }
                None => continue,
            }
        }
    }

    /// Drop any prefix that does not start with the magic. Keeps the last
    /// three bytes when no magic is found, since a magic may straddle two
    /// reads.
    fn discard_to_magic(&mut self) {
        let magic = WIRE_MAGIC.to_be_bytes();
        if let Some(pos) = self
            .buf
            .windows(4)
            .position(|window| window == magic)
        {
            if pos > 0 {
                self.buf.advance(pos);
            }
        } else {
            let keep = self.buf.len().min(3);
            self.buf.advance(self.buf.len() - keep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(payload: &[u8]) -> (Guid, Vec<u8>) {
        let guid = Guid::random();
        (guid, encode_frame(&guid, MessageType::Block, payload))
    }

    #[test]
    fn guid_null_detection() {
        assert!(Guid::NULL.is_null());
        assert!(!Guid::random().is_null());
    }

    #[test]
    fn message_type_codes_roundtrip() {
        for code in 0..=20u16 {
            if let Some(ty) = MessageType::from_u16(code) {
                assert_eq!(ty as u16, code);
            } else {
                assert!(!(2..=10).contains(&code));
            }
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let (guid, bytes) = frame_bytes(b"(payload)");
        let mut dec = FrameDecoder::new();
        dec.extend(&bytes);

        let frame = dec.next_frame().expect("one frame");
        assert_eq!(frame.guid, guid);
        assert_eq!(frame.msg_type, MessageType::Block);
        assert_eq!(&frame.payload[..], b"(payload)");
        assert!(dec.next_frame().is_none());
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn header_layout_is_fixed() {
        let bytes = encode_frame(&Guid::NULL, MessageType::Handshake, b"xy");
        assert_eq!(&bytes[0..4], b"TRJT");
        assert_eq!(&bytes[4..8], &2u32.to_be_bytes());
        assert_eq!(&bytes[8..24], &[0u8; 16]);
        assert_eq!(&bytes[24..26], &2u16.to_be_bytes());
        assert_eq!(&bytes[26..], b"xy");
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let (guid, bytes) = frame_bytes(b"drip");
        let mut dec = FrameDecoder::new();
        for (i, byte) in bytes.iter().enumerate() {
            dec.extend(&[*byte]);
            if i + 1 < bytes.len() {
                assert!(dec.next_frame().is_none(), "frame complete too early");
            }
        }
        let frame = dec.next_frame().expect("complete at final byte");
        assert_eq!(frame.guid, guid);
        assert_eq!(&frame.payload[..], b"drip");
    }

    #[test]
    fn garbage_prefix_is_discarded() {
        let (_, bytes) = frame_bytes(b"ok");
        let mut dec = FrameDecoder::new();
        dec.extend(b"noise noise noise");
        dec.extend(&bytes);
        let frame = dec.next_frame().expect("frame after garbage");
        assert_eq!(&frame.payload[..], b"ok");
    }

    #[test]
    fn two_frames_in_one_read() {
        let (_, a) = frame_bytes(b"first");
        let (_, b) = frame_bytes(b"second");
        let mut combined = a.clone();
        combined.extend_from_slice(&b);

        let mut dec = FrameDecoder::new();
        dec.extend(&combined);
        assert_eq!(&dec.next_frame().unwrap().payload[..], b"first");
        assert_eq!(&dec.next_frame().unwrap().payload[..], b"second");
        assert!(dec.next_frame().is_none());
    }

    #[test]
    fn unknown_type_is_skipped() {
        let mut bad = encode_frame(&Guid::random(), MessageType::Block, b"bad");
        bad[24..26].copy_from_slice(&999u16.to_be_bytes());
        let (_, good) = frame_bytes(b"good");

        let mut dec = FrameDecoder::new();
        dec.extend(&bad);
        dec.extend(&good);
        let frame = dec.next_frame().expect("skips the unknown frame");
        assert_eq!(&frame.payload[..], b"good");
    }

    #[test]
    fn oversize_length_resynchronizes() {
        let mut bad = encode_frame(&Guid::random(), MessageType::Block, b"x");
        bad[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        let (_, good) = frame_bytes(b"fine");

        let mut dec = FrameDecoder::new();
        dec.extend(&bad);
        dec.extend(&good);
        let frame = dec.next_frame().expect("recovers after bogus length");
        assert_eq!(&frame.payload[..], b"fine");
    }

    #[test]
    fn partial_magic_survives_garbage_drop() {
        let (_, bytes) = frame_bytes(b"tail");
        let mut dec = FrameDecoder::new();
        // Garbage, then the first two magic bytes; the rest arrives later.
        dec.extend(b"zzzzzzTR");
        assert!(dec.next_frame().is_none());
        dec.extend(&bytes[2..]);
        let frame = dec.next_frame().expect("magic straddling reads");
        assert_eq!(&frame.payload[..], b"tail");
    }
}
