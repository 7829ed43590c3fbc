//! Error types for the WebSocket server.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use websocket_server::{Result, Session};
//!
//! fn feed(session: &mut Session, bytes: &[u8]) -> Result<()> {
//!     session.on_data(bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Handshake | [`Error::MalformedHandshake`], [`Error::HeaderLimit`], [`Error::UpstreamRejected`] |
//! | Framing | [`Error::UnmaskedClientFrame`], [`Error::UnsupportedFrameLength`], [`Error::OversizedPacket`], [`Error::InvalidFrame`] |
//! | Session | [`Error::NotOpen`], [`Error::TransportClosed`] |
//! | Configuration | [`Error::Config`] |
//! | External | [`Error::Io`] |
//!
//! Every handshake and framing error is terminal for the connection it
//! occurred on. None of them is fatal to the process.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// Upgrade request is missing required headers or has a bad request line.
    #[error("Malformed handshake: {message}")]
    MalformedHandshake {
        /// Description of what was wrong with the request.
        message: String,
    },

    /// Peer sent more header lines than allowed.
    #[error("Too many handshake lines (limit {limit})")]
    HeaderLimit {
        /// Maximum number of lines scanned per handshake.
        limit: usize,
    },

    /// Route resolution or the upstream handler refused the connection.
    #[error("Upstream rejected: {message}")]
    UpstreamRejected {
        /// Why the upstream was not attached.
        message: String,
    },

    // ========================================================================
    // Framing Errors
    // ========================================================================
    /// Client-to-server RFC 6455 frame without the mask bit.
    #[error("Client frame is not masked")]
    UnmaskedClientFrame,

    /// Frame length encoding this implementation does not handle.
    ///
    /// Returned for 64-bit extended lengths and for outgoing payloads of
    /// 65536 bytes or more.
    #[error("Unsupported frame length: {message}")]
    UnsupportedFrameLength {
        /// Which length form was encountered.
        message: String,
    },

    /// Declared or buffered frame size reached the configured maximum.
    #[error("Packet of {size} bytes exceeds limit of {limit} bytes")]
    OversizedPacket {
        /// Size that triggered the check.
        size: usize,
        /// Configured maximum packet size.
        limit: usize,
    },

    /// Unknown frame type or opcode.
    #[error("Invalid frame: {message}")]
    InvalidFrame {
        /// Description of the violation.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Operation requires an open session.
    #[error("Session is not open")]
    NotOpen,

    /// The underlying transport went away.
    #[error("Transport closed")]
    TransportClosed,

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when server configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a malformed handshake error.
    #[inline]
    pub fn malformed_handshake(message: impl Into<String>) -> Self {
        Self::MalformedHandshake {
            message: message.into(),
        }
    }

    /// Creates a header limit error.
    #[inline]
    pub fn header_limit(limit: usize) -> Self {
        Self::HeaderLimit { limit }
    }

    /// Creates an upstream rejected error.
    #[inline]
    pub fn upstream_rejected(message: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            message: message.into(),
        }
    }

    /// Creates an unsupported frame length error.
    #[inline]
    pub fn unsupported_frame_length(message: impl Into<String>) -> Self {
        Self::UnsupportedFrameLength {
            message: message.into(),
        }
    }

    /// Creates an oversized packet error.
    #[inline]
    pub fn oversized_packet(size: usize, limit: usize) -> Self {
        Self::OversizedPacket { size, limit }
    }

    /// Creates an invalid frame error.
    #[inline]
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error happened while negotiating the upgrade.
    #[inline]
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedHandshake { .. } | Self::HeaderLimit { .. } | Self::UpstreamRejected { .. }
        )
    }

    /// Returns `true` if the peer violated the framing protocol.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::UnmaskedClientFrame
                | Self::UnsupportedFrameLength { .. }
                | Self::OversizedPacket { .. }
                | Self::InvalidFrame { .. }
        )
    }

    /// Returns `true` if the connection cannot continue after this error.
    ///
    /// [`Error::NotOpen`] only rejects a single send and
    /// [`Error::Config`] never reaches a connection.
    #[inline]
    #[must_use]
    pub fn is_fatal_to_connection(&self) -> bool {
        !matches!(self, Self::NotOpen | Self::Config { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::malformed_handshake("missing Host");
        assert_eq!(err.to_string(), "Malformed handshake: missing Host");
    }

    #[test]
    fn test_oversized_display() {
        let err = Error::oversized_packet(20000, 16384);
        assert_eq!(
            err.to_string(),
            "Packet of 20000 bytes exceeds limit of 16384 bytes"
        );
    }

    #[test]
    fn test_is_handshake_error() {
        assert!(Error::header_limit(100).is_handshake_error());
        assert!(Error::upstream_rejected("no route").is_handshake_error());
        assert!(!Error::UnmaskedClientFrame.is_handshake_error());
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(Error::UnmaskedClientFrame.is_protocol_error());
        assert!(Error::oversized_packet(1, 1).is_protocol_error());
        assert!(Error::unsupported_frame_length("64-bit").is_protocol_error());
        assert!(!Error::TransportClosed.is_protocol_error());
    }

    #[test]
    fn test_is_fatal_to_connection() {
        assert!(Error::TransportClosed.is_fatal_to_connection());
        assert!(Error::invalid_frame("opcode 3").is_fatal_to_connection());
        assert!(!Error::NotOpen.is_fatal_to_connection());
        assert!(!Error::config("bad").is_fatal_to_connection());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
