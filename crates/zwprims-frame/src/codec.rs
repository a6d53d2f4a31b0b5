use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::{FrameError, InvalidFrame, Result};

/// Start of a data frame.
pub const SOF: u8 = 0x01;
/// Frame accepted.
pub const ACK: u8 = 0x06;
/// Frame rejected (checksum or framing error).
pub const NAK: u8 = 0x15;
/// Frame dropped because the receiver was busy transmitting.
pub const CAN: u8 = 0x18;

/// SOF + length.
const HEADER_SIZE: usize = 2;

/// Smallest legal length byte: type + function id + checksum.
const MIN_LENGTH: u8 = 3;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize - MIN_LENGTH as usize;

/// Direction of a data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Host command, or unsolicited controller frame (callbacks, events).
    Request,
    /// Controller's direct answer to a host request.
    Response,
}

impl FrameKind {
    pub fn as_byte(self) -> u8 {
        match self {
            FrameKind::Request => 0x00,
            FrameKind::Response => 0x01,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(FrameKind::Request),
            0x01 => Some(FrameKind::Response),
            _ => None,
        }
    }
}

/// Single-byte handshake signal exchanged between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlToken {
    Ack,
    Nak,
    Can,
}

impl ControlToken {
    pub fn as_byte(self) -> u8 {
        match self {
            ControlToken::Ack => ACK,
            ControlToken::Nak => NAK,
            ControlToken::Can => CAN,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ACK => Some(ControlToken::Ack),
            NAK => Some(ControlToken::Nak),
            CAN => Some(ControlToken::Can),
            _ => None,
        }
    }
}

/// A checksum-verified data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Serial API function this frame belongs to.
    pub function_id: u8,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: FrameKind, function_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            function_id,
            payload: payload.into(),
        }
    }

    /// Create a request frame.
    pub fn request(function_id: u8, payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Request, function_id, payload)
    }

    /// Create a response frame.
    pub fn response(function_id: u8, payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Response, function_id, payload)
    }

    pub fn is_response(&self) -> bool {
        self.kind == FrameKind::Response
    }

    /// The total wire size of this frame (SOF, length, type, function, payload, checksum).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + MIN_LENGTH as usize + self.payload.len()
    }
}

/// XOR checksum over `bytes`, complemented.
///
/// Covers everything from the length byte through the last payload byte.
pub fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, byte| acc ^ byte)
}

/// Encode a data frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬────────┬──────┬──────────┬─────────────┬──────────┐
/// │ SOF  │ Length │ Type │ Function │ Payload     │ Checksum │
/// │ 0x01 │ (1B)   │ (1B) │ (1B)     │ (Length-3B) │ (1B)     │
/// └──────┴────────┴──────┴──────────┴─────────────┴──────────┘
/// ```
pub fn encode_frame(
    kind: FrameKind,
    function_id: u8,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    let start = dst.len();
    dst.reserve(HEADER_SIZE + MIN_LENGTH as usize + payload.len());
    dst.put_u8(SOF);
    dst.put_u8(payload.len() as u8 + MIN_LENGTH);
    dst.put_u8(kind.as_byte());
    dst.put_u8(function_id);
    dst.put_slice(payload);
    let sum = checksum(&dst[start + 1..]);
    dst.put_u8(sum);
    Ok(())
}

/// Outcome of classifying the head of a receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete, checksum-verified data frame.
    Frame(Frame),
    /// A handshake byte outside any frame.
    Control(ControlToken),
    /// The buffer starts a frame that has not fully arrived.
    Incomplete,
    /// A malformed frame; the caller NAKs and drops exactly these bytes.
    Invalid(InvalidFrame),
    /// A stray byte that is neither SOF nor a control token.
    Discard(u8),
}

/// Classify the head of `buf` without mutating it.
///
/// Returns the outcome together with the number of bytes it accounts for.
/// `Incomplete` always consumes nothing, so callers can append more bytes and
/// retry. Invalid frames consume only their own bytes, letting the reader
/// resynchronise on the next SOF.
pub fn try_decode(buf: &[u8]) -> (Decoded, usize) {
    let Some(&first) = buf.first() else {
        return (Decoded::Incomplete, 0);
    };

    if first != SOF {
        return match ControlToken::from_byte(first) {
            Some(token) => (Decoded::Control(token), 1),
            None => (Decoded::Discard(first), 1),
        };
    }

    if buf.len() < HEADER_SIZE {
        return (Decoded::Incomplete, 0);
    }

    let length = buf[1];
    if length < MIN_LENGTH {
        return (
            Decoded::Invalid(InvalidFrame::InvalidLength(length)),
            HEADER_SIZE,
        );
    }

    let total = HEADER_SIZE + length as usize;
    if buf.len() < total {
        return (Decoded::Incomplete, 0);
    }

    let expected = checksum(&buf[1..total - 1]);
    let actual = buf[total - 1];
    if expected != actual {
        return (
            Decoded::Invalid(InvalidFrame::ChecksumMismatch { expected, actual }),
            total,
        );
    }

    let Some(kind) = FrameKind::from_byte(buf[2]) else {
        return (
            Decoded::Invalid(InvalidFrame::UnknownFrameType(buf[2])),
            total,
        );
    };

    let frame = Frame {
        kind,
        function_id: buf[3],
        payload: Bytes::copy_from_slice(&buf[4..total - 1]),
    };
    (Decoded::Frame(frame), total)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum outbound payload size in bytes. Default and ceiling: [`MAX_PAYLOAD`].
    pub max_payload_size: usize,
    /// Bound on a single blocking write.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            write_timeout: None,
        }
    }
}

/// Something the link reader needs to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(Frame),
    Control(ControlToken),
    Invalid(InvalidFrame),
}

/// Something the link writer puts on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    Control(ControlToken),
}

/// Streaming codec for `tokio_util::codec::{FramedRead, FramedWrite}`.
///
/// Noise bytes are skipped inside the decoder; every other classification is
/// surfaced as an [`Inbound`] item.
#[derive(Debug, Clone)]
pub struct SerialCodec {
    max_payload: usize,
}

impl SerialCodec {
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            max_payload: config.max_payload_size.min(MAX_PAYLOAD),
        }
    }
}

impl Default for SerialCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SerialCodec {
    type Item = Inbound;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        loop {
            let (decoded, consumed) = try_decode(src);
            src.advance(consumed);
            let item = match decoded {
                Decoded::Incomplete => return Ok(None),
                Decoded::Discard(byte) => {
                    trace!(byte = format_args!("{byte:#04x}"), "discarding line noise");
                    continue;
                }
                Decoded::Frame(frame) => Inbound::Frame(frame),
                Decoded::Control(token) => Inbound::Control(token),
                Decoded::Invalid(reason) => Inbound::Invalid(reason),
            };
            return Ok(Some(item));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Outbound> for SerialCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<()> {
        match item {
            Outbound::Control(token) => {
                dst.put_u8(token.as_byte());
                Ok(())
            }
            Outbound::Frame(frame) => {
                if frame.payload.len() > self.max_payload {
                    return Err(FrameError::PayloadTooLarge {
                        size: frame.payload.len(),
                        max: self.max_payload,
                    });
                }
                encode_frame(frame.kind, frame.function_id, &frame.payload, dst)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(kind: FrameKind, function_id: u8, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(kind, function_id, payload, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_get_version_request_matches_published_bytes() {
        let buf = encoded(FrameKind::Request, 0x15, b"");
        assert_eq!(buf.as_ref(), &[0x01, 0x03, 0x00, 0x15, 0xE9]);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let buf = encoded(FrameKind::Response, 0x13, &[0x01]);
        assert_eq!(buf.len(), 6);

        let (decoded, consumed) = try_decode(&buf);
        assert_eq!(consumed, buf.len());
        assert_eq!(
            decoded,
            Decoded::Frame(Frame::response(0x13, Bytes::from_static(&[0x01])))
        );
    }

    #[test]
    fn test_roundtrip_every_payload_length() {
        for len in 0..=MAX_PAYLOAD {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let buf = encoded(FrameKind::Request, 0x04, &payload);

            let (decoded, consumed) = try_decode(&buf);
            assert_eq!(consumed, buf.len(), "length {len}");
            match decoded {
                Decoded::Frame(frame) => {
                    assert_eq!(frame.kind, FrameKind::Request);
                    assert_eq!(frame.function_id, 0x04);
                    assert_eq!(frame.payload.as_ref(), payload.as_slice());
                }
                other => panic!("length {len}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_payload_too_large() {
        let mut buf = BytesMut::new();
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        let result = encode_frame(FrameKind::Request, 0x13, &payload, &mut buf);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size, max }) if size == MAX_PAYLOAD + 1 && max == MAX_PAYLOAD
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_control_tokens() {
        assert_eq!(try_decode(&[ACK]), (Decoded::Control(ControlToken::Ack), 1));
        assert_eq!(try_decode(&[NAK, SOF]), (Decoded::Control(ControlToken::Nak), 1));
        assert_eq!(try_decode(&[CAN]), (Decoded::Control(ControlToken::Can), 1));
    }

    #[test]
    fn test_noise_byte_discarded() {
        assert_eq!(try_decode(&[0x42, SOF]), (Decoded::Discard(0x42), 1));
    }

    #[test]
    fn test_incomplete_consumes_nothing() {
        assert_eq!(try_decode(&[]), (Decoded::Incomplete, 0));
        assert_eq!(try_decode(&[SOF]), (Decoded::Incomplete, 0));

        let buf = encoded(FrameKind::Request, 0x04, &[1, 2, 3, 4]);
        for cut in 1..buf.len() {
            assert_eq!(try_decode(&buf[..cut]), (Decoded::Incomplete, 0), "cut {cut}");
        }
    }

    #[test]
    fn test_invalid_length_skips_header_only() {
        let (decoded, consumed) = try_decode(&[SOF, 0x02, 0x00, 0x15]);
        assert_eq!(decoded, Decoded::Invalid(InvalidFrame::InvalidLength(2)));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_unknown_type_consumes_frame() {
        let mut buf = encoded(FrameKind::Request, 0x15, b"");
        buf[2] = 0x07;
        let last = buf.len() - 1;
        buf[last] = checksum(&buf[1..last]);

        let (decoded, consumed) = try_decode(&buf);
        assert_eq!(decoded, Decoded::Invalid(InvalidFrame::UnknownFrameType(0x07)));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_single_byte_corruption_always_detected() {
        let clean = encoded(FrameKind::Request, 0x04, &[0x00, 0x05, 0x03, 0x20, 0x03, 0xFF]);

        for index in 2..clean.len() {
            for flip in 1..=u8::MAX {
                let mut corrupted = clean.clone();
                corrupted[index] ^= flip;
                let (decoded, consumed) = try_decode(&corrupted);
                assert!(
                    matches!(
                        decoded,
                        Decoded::Invalid(InvalidFrame::ChecksumMismatch { .. })
                    ),
                    "index {index} flip {flip:#04x}: {decoded:?}"
                );
                assert_eq!(consumed, clean.len());
            }
        }
    }

    #[test]
    fn test_corrupted_length_never_yields_frame() {
        let clean = encoded(FrameKind::Request, 0x04, &[0x10, 0x20, 0x30]);
        for flip in 1..=u8::MAX {
            let mut corrupted = clean.clone();
            corrupted[1] ^= flip;
            let (decoded, _) = try_decode(&corrupted);
            if let Decoded::Frame(frame) = decoded {
                assert_ne!(frame.payload.as_ref(), &[0x10, 0x20, 0x30]);
            }
        }
    }

    #[test]
    fn test_codec_resynchronises_after_bad_frame() {
        let mut codec = SerialCodec::new();
        let mut buf = BytesMut::new();
        buf.put_slice(&[0x55, 0xAA]);
        let mut bad = encoded(FrameKind::Request, 0x04, &[1, 2]);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        buf.put_slice(&bad);
        buf.put_u8(ACK);
        buf.put_slice(&encoded(FrameKind::Response, 0x15, b"Z-Wave 7.18\0\x07"));

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(
            first,
            Inbound::Invalid(InvalidFrame::ChecksumMismatch { .. })
        ));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Inbound::Control(ControlToken::Ack))
        );
        let third = codec.decode(&mut buf).unwrap().unwrap();
        match third {
            Inbound::Frame(frame) => {
                assert_eq!(frame.function_id, 0x15);
                assert!(frame.is_response());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_eof_mid_frame() {
        let mut codec = SerialCodec::new();
        let full = encoded(FrameKind::Request, 0x04, &[1, 2, 3]);
        let mut buf = BytesMut::from(&full[..4]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_encoder_respects_configured_limit() {
        let mut codec = SerialCodec::with_config(&FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        });
        let mut buf = BytesMut::new();
        let err = codec
            .encode(Outbound::Frame(Frame::request(0x13, vec![0u8; 5])), &mut buf)
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 5, max: 4 }));

        codec
            .encode(Outbound::Control(ControlToken::Nak), &mut buf)
            .unwrap();
        assert_eq!(buf.as_ref(), &[NAK]);
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::request(0x13, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), encoded(frame.kind, 0x13, b"test").len());
    }
}
