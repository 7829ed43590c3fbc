//! RFC 6455 frame codec.
//!
//! # Header Layout
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16)               |
//! |N|V|V|V|       |S|             |     (if payload len == 126)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                 Masking key (client frames only)              |
//! +---------------------------------------------------------------+
//! ```
//!
//! # Limits
//!
//! - 64-bit extended lengths (`127`) are rejected in both directions.
//! - FIN is always set on encode. On decode FIN and RSV are ignored, so a
//!   fragment is delivered as an ordinary frame and never reassembled.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::frame::{Decoded, Frame, Opcode};

// ============================================================================
// Constants
// ============================================================================

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;
const LENGTH_MASK: u8 = 0x7F;

/// Largest length that fits in the 7-bit field.
const MAX_INLINE_LENGTH: usize = 125;

/// Length marker for a 16-bit extended length.
const EXTENDED_16: u8 = 126;

/// Length marker for a 64-bit extended length (unsupported).
const EXTENDED_64: u8 = 127;

/// Close status sent when a client violates the protocol.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;

// ============================================================================
// Encoding
// ============================================================================

/// Encodes one unmasked server frame with FIN set.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFrameLength`] for payloads of 65536 bytes or
/// more.
pub fn encode(payload: &[u8], opcode: Opcode) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    push_header(&mut out, payload.len(), opcode, false)?;
    out.extend_from_slice(payload);
    Ok(out)
}

/// Encodes one masked frame, as a client would send it.
///
/// # Errors
///
/// Same as [`encode`].
pub fn encode_masked(payload: &[u8], opcode: Opcode, mask: [u8; 4]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    push_header(&mut out, payload.len(), opcode, true)?;
    out.extend_from_slice(&mask);

    let start = out.len();
    out.extend_from_slice(payload);
    apply_mask(&mut out[start..], mask);
    Ok(out)
}

/// Builds the payload of a close frame carrying `code`.
#[inline]
#[must_use]
pub const fn close_payload(code: u16) -> [u8; 2] {
    code.to_be_bytes()
}

fn push_header(out: &mut Vec<u8>, len: usize, opcode: Opcode, masked: bool) -> Result<()> {
    let mask_bit = if masked { MASK_BIT } else { 0 };
    out.push(FIN_BIT | opcode.as_u8());

    if len <= MAX_INLINE_LENGTH {
        out.push(mask_bit | len as u8);
    } else if let Ok(len16) = u16::try_from(len) {
        out.push(mask_bit | EXTENDED_16);
        out.extend_from_slice(&len16.to_be_bytes());
    } else {
        return Err(Error::unsupported_frame_length(format!(
            "cannot encode {len}-byte payload without 64-bit length"
        )));
    }

    Ok(())
}

/// XORs `payload` in place with the repeating 4-byte `mask`.
///
/// Applying the same mask twice restores the input.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes one client frame from the head of `buf`.
///
/// # Errors
///
/// - [`Error::UnmaskedClientFrame`] if the mask bit is clear
/// - [`Error::UnsupportedFrameLength`] for 64-bit extended lengths
/// - [`Error::OversizedPacket`] if the declared length reaches `max_packet`
/// - [`Error::InvalidFrame`] for reserved opcodes
pub fn decode(buf: &[u8], max_packet: usize) -> Result<Decoded> {
    let [b0, b1, ..] = *buf else {
        return Ok(Decoded::NeedMore);
    };

    if b1 & MASK_BIT == 0 {
        return Err(Error::UnmaskedClientFrame);
    }

    let opcode = Opcode::from_u8(b0 & OPCODE_MASK)?;

    let (len, header_len) = match b1 & LENGTH_MASK {
        EXTENDED_64 => {
            return Err(Error::unsupported_frame_length(
                "64-bit extended payload length",
            ));
        }
        EXTENDED_16 => match buf.get(2..4) {
            Some(&[hi, lo]) => (usize::from(u16::from_be_bytes([hi, lo])), 4),
            _ => return Ok(Decoded::NeedMore),
        },
        inline => (usize::from(inline), 2),
    };

    if len >= max_packet {
        return Err(Error::oversized_packet(len, max_packet));
    }

    let payload_start = header_len + 4;
    let total = payload_start + len;
    if buf.len() < total {
        return Ok(Decoded::NeedMore);
    }

    let mask = [
        buf[header_len],
        buf[header_len + 1],
        buf[header_len + 2],
        buf[header_len + 3],
    ];
    let mut payload = buf[payload_start..total].to_vec();
    apply_mask(&mut payload, mask);

    Ok(Decoded::Frame {
        frame: Frame::new(opcode, payload),
        consumed: total,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    const MAX: usize = 1 << 17;
    const MASK: [u8; 4] = [0x37, 0xFA, 0x21, 0x3D];

    fn arb_opcode() -> impl Strategy<Value = Opcode> {
        prop_oneof![
            Just(Opcode::Continuation),
            Just(Opcode::Text),
            Just(Opcode::Binary),
            Just(Opcode::Close),
            Just(Opcode::Ping),
            Just(Opcode::Pong),
        ]
    }

    #[test]
    fn test_encode_short() {
        let encoded = encode(b"Hello", Opcode::Text).expect("encode");
        assert_eq!(encoded, [0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_encode_extended_16() {
        let encoded = encode(&[0u8; 256], Opcode::Binary).expect("encode");
        assert_eq!(&encoded[..4], &[0x82, 126, 0x01, 0x00]);
        assert_eq!(encoded.len(), 260);

        let encoded = encode(&[0u8; 65535], Opcode::Binary).expect("encode");
        assert_eq!(&encoded[..4], &[0x82, 126, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_too_long() {
        let err = encode(&vec![0u8; 65536], Opcode::Binary).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFrameLength { .. }));
    }

    #[test]
    fn test_decode_rfc_sample() {
        // RFC 6455 section 5.7: masked "Hello".
        let frame = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        match decode(&frame, MAX).expect("decode") {
            Decoded::Frame { frame, consumed } => {
                assert_eq!(frame, Frame::text("Hello"));
                assert_eq!(consumed, 11);
            }
            Decoded::NeedMore => panic!("expected frame"),
        }
    }

    #[test]
    fn test_decode_unmasked_rejected() {
        let err = decode(&[0x81, 0x05, b'H', b'e', b'l', b'l', b'o'], MAX).unwrap_err();
        assert!(matches!(err, Error::UnmaskedClientFrame));
    }

    #[test]
    fn test_decode_64_bit_length_rejected() {
        let err = decode(&[0x82, 0xFF, 0, 0, 0, 0, 0, 1, 0, 0], MAX).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFrameLength { .. }));
    }

    #[test]
    fn test_decode_reserved_opcode() {
        let frame = encode_masked(b"x", Opcode::Text, MASK).expect("encode");
        let mut bad = frame.clone();
        bad[0] = 0x83;
        assert!(matches!(decode(&bad, MAX), Err(Error::InvalidFrame { .. })));
    }

    #[test]
    fn test_decode_oversize() {
        let frame = encode_masked(&[1u8; 200], Opcode::Binary, MASK).expect("encode");

        // Header alone is enough to reject.
        let err = decode(&frame[..4], 200).unwrap_err();
        assert!(matches!(err, Error::OversizedPacket { size: 200, limit: 200 }));

        assert!(matches!(decode(&frame, 201), Ok(Decoded::Frame { .. })));
    }

    #[test]
    fn test_decode_fin_clear_is_delivered() {
        let mut frame = encode_masked(b"part", Opcode::Text, MASK).expect("encode");
        frame[0] &= !FIN_BIT;
        match decode(&frame, MAX).expect("decode") {
            Decoded::Frame { frame, .. } => assert_eq!(frame, Frame::text("part")),
            Decoded::NeedMore => panic!("expected frame"),
        }
    }

    #[test]
    fn test_decode_short_buffers() {
        assert_eq!(decode(&[], MAX).ok(), Some(Decoded::NeedMore));
        assert_eq!(decode(&[0x81], MAX).ok(), Some(Decoded::NeedMore));
        assert_eq!(decode(&[0x82, 0xFE, 0x01], MAX).ok(), Some(Decoded::NeedMore));
    }

    #[test]
    fn test_apply_mask_is_involution() {
        let mut payload = b"Hello, World!".to_vec();
        apply_mask(&mut payload, MASK);
        assert_ne!(payload, b"Hello, World!");
        apply_mask(&mut payload, MASK);
        assert_eq!(payload, b"Hello, World!");
    }

    #[test]
    fn test_close_payload() {
        assert_eq!(close_payload(CLOSE_PROTOCOL_ERROR), [0x03, 0xEA]);
    }

    proptest! {
        #[test]
        fn masked_roundtrip(
            payload in proptest::collection::vec(any::<u8>(), 0..65536),
            opcode in arb_opcode(),
            mask in any::<[u8; 4]>(),
        ) {
            let encoded = encode_masked(&payload, opcode, mask).expect("encode");
            match decode(&encoded, MAX).expect("decode") {
                Decoded::Frame { frame, consumed } => {
                    prop_assert_eq!(consumed, encoded.len());
                    prop_assert_eq!(frame, Frame::new(opcode, payload));
                }
                Decoded::NeedMore => prop_assert!(false, "complete frame reported incomplete"),
            }
        }

        #[test]
        fn split_frame_needs_more(
            payload in proptest::collection::vec(any::<u8>(), 0..1024),
            opcode in arb_opcode(),
            mask in any::<[u8; 4]>(),
            cut in any::<prop::sample::Index>(),
        ) {
            let encoded = encode_masked(&payload, opcode, mask).expect("encode");
            let split = cut.index(encoded.len());
            prop_assert_eq!(decode(&encoded[..split], MAX).ok(), Some(Decoded::NeedMore));
        }

        #[test]
        fn unmasked_always_rejected(
            payload in proptest::collection::vec(any::<u8>(), 0..300),
            opcode in arb_opcode(),
        ) {
            let encoded = encode(&payload, opcode).expect("encode");
            prop_assert!(matches!(decode(&encoded, MAX), Err(Error::UnmaskedClientFrame)));
        }
    }
}
