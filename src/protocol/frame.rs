//! Frame model shared by both codecs.
//!
//! A [`Frame`] is one decoded application message. The modern protocol tags
//! frames with an RFC 6455 [`Opcode`]; the legacy protocol only knows text
//! (`0x00`) and binary (`0x80`) frames, which map to [`Opcode::Text`] and
//! [`Opcode::Binary`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// Opcode
// ============================================================================

/// Frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation of a fragmented message (`0x0`).
    Continuation,
    /// UTF-8 text (`0x1`).
    Text,
    /// Binary data (`0x2`).
    Binary,
    /// Connection close (`0x8`).
    Close,
    /// Ping (`0x9`).
    Ping,
    /// Pong (`0xA`).
    Pong,
}

impl Opcode {
    /// Parses the low nibble of an RFC 6455 frame header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrame`] for reserved opcodes.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(Error::invalid_frame(format!(
                "reserved opcode {other:#x}"
            ))),
        }
    }

    /// Returns the RFC 6455 wire value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Returns `true` for close, ping and pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type.
    pub opcode: Opcode,
    /// Unmasked payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a frame.
    #[inline]
    #[must_use]
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Creates a text frame.
    #[inline]
    #[must_use]
    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    /// Creates a binary frame.
    #[inline]
    #[must_use]
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    /// Returns the payload as UTF-8, if it is valid.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

// ============================================================================
// Decoded
// ============================================================================

/// Outcome of a successful decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame was parsed from the head of the buffer.
    Frame {
        /// The frame.
        frame: Frame,
        /// Number of bytes the caller must drop from the buffer head.
        consumed: usize,
    },
    /// The buffer holds an incomplete frame. Nothing was consumed.
    NeedMore,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::from_u8(0x1).ok(), Some(Opcode::Text));
        assert_eq!(Opcode::from_u8(0xA).ok(), Some(Opcode::Pong));
        for reserved in [0x3, 0x7, 0xB, 0xF] {
            assert!(matches!(
                Opcode::from_u8(reserved),
                Err(Error::InvalidFrame { .. })
            ));
        }
    }

    #[test]
    fn test_opcode_wire_values() {
        for opcode in [
            Opcode::Continuation,
            Opcode::Text,
            Opcode::Binary,
            Opcode::Close,
            Opcode::Ping,
            Opcode::Pong,
        ] {
            assert_eq!(Opcode::from_u8(opcode.as_u8()).ok(), Some(opcode));
        }
    }

    #[test]
    fn test_opcode_is_control() {
        assert!(Opcode::Ping.is_control());
        assert!(Opcode::Close.is_control());
        assert!(!Opcode::Text.is_control());
        assert!(!Opcode::Continuation.is_control());
    }

    #[test]
    fn test_frame_as_text() {
        assert_eq!(Frame::text("Hello").as_text(), Some("Hello"));
        assert_eq!(Frame::binary(vec![0xFF, 0xFE]).as_text(), None);
    }
}
