//! Legacy (pre-RFC 6455 draft) frame codec.
//!
//! # Wire Format
//!
//! | Type | Layout |
//! |------|--------|
//! | Text | `0x00` payload `0xFF` |
//! | Binary | `0x80` varint-length payload |
//!
//! The binary length is a big-endian base-128 number. Every byte except the
//! last carries the `0x80` continuation bit.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::frame::{Decoded, Frame, Opcode};

// ============================================================================
// Constants
// ============================================================================

/// Leading byte of a text frame.
pub const TEXT_FRAME: u8 = 0x00;

/// Leading byte of a binary frame.
pub const BINARY_FRAME: u8 = 0x80;

/// Terminator of a text frame.
pub const TEXT_TERMINATOR: u8 = 0xFF;

const CONTINUATION_BIT: u8 = 0x80;

// ============================================================================
// Encoding
// ============================================================================

/// Encodes one legacy frame.
///
/// # Errors
///
/// Returns [`Error::InvalidFrame`] for anything but text and binary; the
/// draft protocol has no control frames.
pub fn encode(payload: &[u8], opcode: Opcode) -> Result<Vec<u8>> {
    match opcode {
        Opcode::Binary => {
            let mut out = Vec::with_capacity(payload.len() + 6);
            out.push(BINARY_FRAME);
            push_length(&mut out, payload.len());
            out.extend_from_slice(payload);
            Ok(out)
        }
        Opcode::Text => {
            let mut out = Vec::with_capacity(payload.len() + 2);
            out.push(TEXT_FRAME);
            out.extend_from_slice(payload);
            out.push(TEXT_TERMINATOR);
            Ok(out)
        }
        other => Err(Error::invalid_frame(format!(
            "legacy protocol cannot carry {other} frames"
        ))),
    }
}

/// Appends `len` as a minimal big-endian base-128 varint.
fn push_length(out: &mut Vec<u8>, mut len: usize) {
    // Least significant digit first, emitted reversed.
    let mut digits = Vec::with_capacity(4);
    loop {
        digits.push((len & 0x7F) as u8);
        len >>= 7;
        if len == 0 {
            break;
        }
    }

    for (i, digit) in digits.iter().enumerate().rev() {
        if i == 0 {
            out.push(*digit);
        } else {
            out.push(digit | CONTINUATION_BIT);
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes one legacy frame from the head of `buf`.
///
/// `max_packet` is the configured maximum packet size.
///
/// # Errors
///
/// - [`Error::OversizedPacket`] if the frame reaches `max_packet`
/// - [`Error::InvalidFrame`] for an unknown leading byte
pub fn decode(buf: &[u8], max_packet: usize) -> Result<Decoded> {
    match buf.first() {
        None => Ok(Decoded::NeedMore),
        Some(&BINARY_FRAME) => decode_binary(buf, max_packet),
        Some(&TEXT_FRAME) => decode_text(buf, max_packet),
        Some(&other) => Err(Error::invalid_frame(format!(
            "unknown legacy frame type {other:#04x}"
        ))),
    }
}

fn decode_binary(buf: &[u8], max_packet: usize) -> Result<Decoded> {
    let mut len: usize = 0;
    let mut idx = 1;

    loop {
        let Some(&byte) = buf.get(idx) else {
            return Ok(Decoded::NeedMore);
        };
        idx += 1;

        len = len
            .checked_mul(128)
            .and_then(|l| l.checked_add(usize::from(byte & 0x7F)))
            .ok_or_else(|| Error::oversized_packet(usize::MAX, max_packet))?;

        if len >= max_packet {
            return Err(Error::oversized_packet(len, max_packet));
        }

        if byte & CONTINUATION_BIT == 0 {
            break;
        }
    }

    let total = idx + len;
    if buf.len() < total {
        return Ok(Decoded::NeedMore);
    }

    Ok(Decoded::Frame {
        frame: Frame::binary(&buf[idx..total]),
        consumed: total,
    })
}

fn decode_text(buf: &[u8], max_packet: usize) -> Result<Decoded> {
    match buf.iter().position(|&b| b == TEXT_TERMINATOR) {
        Some(end) => {
            let size = end - 1;
            if size >= max_packet {
                return Err(Error::oversized_packet(size, max_packet));
            }

            Ok(Decoded::Frame {
                frame: Frame::text(&buf[1..end]),
                consumed: end + 1,
            })
        }
        None if buf.len() >= max_packet => Err(Error::oversized_packet(buf.len(), max_packet)),
        None => Ok(Decoded::NeedMore),
    }
}

// ============================================================================
// Tests
// ============================================================================
