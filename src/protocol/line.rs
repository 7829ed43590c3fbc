//! CRLF line extraction for handshake parsing.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Maximum lines scanned per handshake.
pub const MAX_HANDSHAKE_LINES: usize = 100;

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

// ============================================================================
// LineReader
// ============================================================================

/// Pulls CRLF-terminated lines off the head of a receive buffer.
///
/// Counts every extracted line; the reader refuses to hand out more than
/// [`MAX_HANDSHAKE_LINES`] lines so a peer that never terminates its headers
/// cannot keep the handshake open forever.
#[derive(Debug, Default, Clone)]
pub struct LineReader {
    scanned: usize,
}

impl LineReader {
    /// Creates a reader with a fresh line budget.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { scanned: 0 }
    }

    /// Number of lines handed out so far.
    #[inline]
    #[must_use]
    pub const fn scanned(&self) -> usize {
        self.scanned
    }

    /// Extracts the next line, including its CRLF.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched when no CRLF is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeaderLimit`] once the line budget is exhausted.
    pub fn next_line(&mut self, buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>> {
        let Some(pos) = find_crlf(buf) else {
            return Ok(None);
        };

        if self.scanned >= MAX_HANDSHAKE_LINES {
            return Err(Error::header_limit(MAX_HANDSHAKE_LINES));
        }
        self.scanned += 1;

        Ok(Some(buf.drain(..pos + CRLF.len()).collect()))
    }
}

/// Returns `true` if `line` is the bare terminator ending the header block.
#[inline]
#[must_use]
pub fn is_end_of_headers(line: &[u8]) -> bool {
    line == CRLF
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_crlf_leaves_buffer() {
        let mut reader = LineReader::new();
        let mut buf = b"GET / HTTP/1.1".to_vec();
        assert_eq!(reader.next_line(&mut buf).ok(), Some(None));
        assert_eq!(buf, b"GET / HTTP/1.1");
        assert_eq!(reader.scanned(), 0);
    }

    #[test]
    fn test_extracts_lines_in_order() {
        let mut reader = LineReader::new();
        let mut buf = b"Host: x\r\n\r\nrest".to_vec();

        let first = reader.next_line(&mut buf).expect("line").expect("some");
        assert_eq!(first, b"Host: x\r\n");

        let second = reader.next_line(&mut buf).expect("line").expect("some");
        assert!(is_end_of_headers(&second));

        assert_eq!(buf, b"rest");
        assert_eq!(reader.scanned(), 2);
    }

    #[test]
    fn test_bare_lf_is_not_a_line() {
        let mut reader = LineReader::new();
        let mut buf = b"Host: x\n".to_vec();
        assert_eq!(reader.next_line(&mut buf).ok(), Some(None));
    }

    #[test]
    fn test_line_limit() {
        let mut reader = LineReader::new();
        let mut buf = b"X: y\r\n".repeat(MAX_HANDSHAKE_LINES + 1);

        for _ in 0..MAX_HANDSHAKE_LINES {
            assert!(reader.next_line(&mut buf).expect("within budget").is_some());
        }

        let err = reader.next_line(&mut buf).unwrap_err();
        assert!(matches!(err, Error::HeaderLimit { limit: 100 }));
    }
}
