//! WebSocket wire protocol.
//!
//! Everything in this module is sans-IO: functions take byte buffers and
//! return frames, replies, or "need more data".
//!
//! # Protocol Generations
//!
//! | Variant | Handshake | Framing |
//! |---------|-----------|---------|
//! | Legacy | `Sec-WebSocket-Key1/2` + 8-byte body, MD5 token | `0x00..0xFF` text, `0x80` varint binary |
//! | Modern | `Sec-WebSocket-Key`, SHA-1 accept token | RFC 6455 frames, masked client payloads |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame model shared by both codecs |
//! | `handshake` | Upgrade request parsing and negotiation |
//! | `legacy` | Draft frame codec |
//! | `line` | CRLF line reader |
//! | `modern` | RFC 6455 frame codec |

// ============================================================================
// Submodules
// ============================================================================

/// Frame model shared by both codecs.
pub mod frame;

/// Upgrade handshake negotiation.
pub mod handshake;

/// Draft (pre-RFC) frame codec.
pub mod legacy;

/// CRLF line reader for handshake parsing.
pub mod line;

/// RFC 6455 frame codec.
pub mod modern;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Decoded, Frame, Opcode};
pub use handshake::{HandshakeRequest, HandshakeState, Headers, Negotiator, Progress, Upgrade};
pub use line::LineReader;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::Result;

// ============================================================================
// ProtocolVariant
// ============================================================================

/// Protocol generation negotiated for a session.
///
/// Selected once at handshake time; picks the frame codec for the rest of
/// the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVariant {
    /// Pre-standard draft (`Sec-WebSocket-Key1/2`).
    Legacy,
    /// RFC 6455.
    Modern,
}

impl ProtocolVariant {
    /// Encodes an outgoing frame with this variant's codec.
    ///
    /// # Errors
    ///
    /// See [`legacy::encode`] and [`modern::encode`].
    #[inline]
    pub fn encode(self, payload: &[u8], opcode: Opcode) -> Result<Vec<u8>> {
        match self {
            Self::Legacy => legacy::encode(payload, opcode),
            Self::Modern => modern::encode(payload, opcode),
        }
    }

    /// Decodes one incoming frame with this variant's codec.
    ///
    /// # Errors
    ///
    /// See [`legacy::decode`] and [`modern::decode`].
    #[inline]
    pub fn decode(self, buf: &[u8], max_packet: usize) -> Result<Decoded> {
        match self {
            Self::Legacy => legacy::decode(buf, max_packet),
            Self::Modern => modern::decode(buf, max_packet),
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Modern => f.write_str("rfc6455"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
