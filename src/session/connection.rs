//! Write side of a session, as seen by upstream handlers.
//!
//! [`Connection`] owns the outbound byte queue and the pending write
//! callbacks. Upstreams get `&mut Connection` in every hook and use it to
//! send frames or to ask for the connection to be closed.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::net::SocketAddr;

use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{HandshakeRequest, Headers, Opcode, ProtocolVariant};

use super::SessionState;
use super::upstream::WriteCallback;

// ============================================================================
// Connection
// ============================================================================

/// Per-connection output state and request metadata.
pub struct Connection {
    id: SessionId,
    peer: Option<SocketAddr>,
    pub(super) state: SessionState,
    pub(super) variant: Option<ProtocolVariant>,
    pub(super) request: Option<HandshakeRequest>,
    pub(super) outbound: Vec<u8>,
    pub(super) write_ready: bool,
    pub(super) callbacks: VecDeque<WriteCallback>,
    pub(super) close_requested: bool,
}

impl Connection {
    pub(super) fn new(id: SessionId, peer: Option<SocketAddr>) -> Self {
        Self {
            id,
            peer,
            state: SessionState::Connecting,
            variant: None,
            request: None,
            outbound: Vec::new(),
            write_ready: true,
            callbacks: VecDeque::new(),
            close_requested: false,
        }
    }

    /// Session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address, if known.
    #[inline]
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiated protocol generation, once known.
    #[inline]
    #[must_use]
    pub fn variant(&self) -> Option<ProtocolVariant> {
        self.variant
    }

    /// The upgrade request, available from handshake completion on.
    #[inline]
    #[must_use]
    pub fn request(&self) -> Option<&HandshakeRequest> {
        self.request.as_ref()
    }

    /// Request headers, if the handshake got that far.
    #[must_use]
    pub fn headers(&self) -> Option<&Headers> {
        self.request.as_ref().map(|r| &r.headers)
    }

    /// Looks up one request cookie.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies()?.get(name).map(String::as_str)
    }

    /// All request cookies.
    #[must_use]
    pub fn cookies(&self) -> Option<&FxHashMap<String, String>> {
        self.request.as_ref().map(|r| &r.cookies)
    }

    /// `false` between a send and the next write-ready notification.
    #[inline]
    #[must_use]
    pub fn is_write_ready(&self) -> bool {
        self.write_ready
    }

    /// Number of callbacks waiting for a flush.
    #[inline]
    #[must_use]
    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// Returns `true` once [`Connection::finish`] was called.
    #[inline]
    #[must_use]
    pub fn is_close_requested(&self) -> bool {
        self.close_requested
    }

    /// Asks the session to close after the current event.
    pub fn finish(&mut self) {
        self.close_requested = true;
    }

    /// Queues one frame.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] if the handshake has not completed or the session
    ///   is closing; nothing is queued
    /// - [`Error::UnsupportedFrameLength`] / [`Error::InvalidFrame`] if the
    ///   negotiated codec cannot encode the frame; the connection is closed
    pub fn send(&mut self, payload: &[u8], opcode: Opcode) -> Result<()> {
        self.send_frame(payload, opcode, None)
    }

    /// Queues one frame and runs `callback` once its bytes are flushed.
    ///
    /// Callbacks run in the order their frames were queued.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`]. The callback is dropped on error.
    pub fn send_then<F>(&mut self, payload: &[u8], opcode: Opcode, callback: F) -> Result<()>
    where
        F: FnOnce(&mut Connection) + Send + 'static,
    {
        self.send_frame(payload, opcode, Some(Box::new(callback)))
    }

    fn send_frame(
        &mut self,
        payload: &[u8],
        opcode: Opcode,
        callback: Option<WriteCallback>,
    ) -> Result<()> {
        let variant = match (self.state, self.variant) {
            (SessionState::Open, Some(variant)) if !self.close_requested => variant,
            _ => return Err(Error::NotOpen),
        };

        let bytes = variant.encode(payload, opcode).inspect_err(|e| {
            warn!(session = %self.id, error = %e, "Cannot encode outgoing frame, closing");
            self.close_requested = true;
        })?;

        self.queue_raw(&bytes);

        if let Some(callback) = callback {
            self.callbacks.push_back(callback);
        }

        trace!(session = %self.id, %opcode, len = payload.len(), "Frame queued");
        Ok(())
    }

    /// Appends already-encoded bytes to the outbound queue.
    pub(super) fn queue_raw(&mut self, bytes: &[u8]) {
        self.outbound.extend_from_slice(bytes);
        self.write_ready = false;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("variant", &self.variant)
            .field("outbound", &self.outbound.len())
            .field("write_ready", &self.write_ready)
            .field("callbacks", &self.callbacks.len())
            .field("close_requested", &self.close_requested)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
