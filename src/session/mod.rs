//! Per-connection WebSocket session.
//!
//! A [`Session`] is a sans-IO state machine: the host feeds it received bytes
//! with [`Session::on_data`], drains bytes to write with
//! [`Session::take_output`], and reports flushes with
//! [`Session::on_write_ready`].
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──bytes──► Handshaking ──reply queued──► Open
//!      │                     │                          │
//!      └─────────────────────┴───── error / finish ─────┴──► Closing ──► Closed
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Write handle passed to upstreams |
//! | `policy` | Flash policy file responder |
//! | `upstream` | Upstream handler trait and factory type |

// ============================================================================
// Submodules
// ============================================================================

/// Write handle passed to upstream handlers.
pub mod connection;

/// Flash cross-domain policy responder.
pub mod policy;

/// Upstream handler trait.
pub mod upstream;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use policy::{PolicyProvider, StaticPolicy};
pub use upstream::{Upstream, UpstreamFactory, WriteCallback};

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::frame::Decoded;
use crate::protocol::handshake::{HandshakeRequest, HandshakeState, Negotiator, Progress, Upgrade};
use crate::protocol::line::CRLF;
use crate::protocol::modern;
use crate::protocol::{Frame, Opcode, ProtocolVariant};
use crate::server::RouteRegistry;

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Accepted, nothing received yet.
    Connecting,
    /// Receiving the upgrade request.
    Handshaking,
    /// Upgrade reply queued, frames flow both ways.
    Open,
    /// Tearing down.
    Closing,
    /// Finalized. Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// SessionSettings
// ============================================================================

/// Shared settings every session of a server is created with.
#[derive(Clone)]
pub struct SessionSettings {
    /// Largest accepted frame payload and pending handshake line, in bytes.
    pub max_packet: usize,
    /// Route name to upstream factory mapping.
    pub routes: Arc<RouteRegistry>,
    /// Flash policy source. `None` disables the policy responder.
    pub policy: Option<Arc<dyn PolicyProvider>>,
}

impl SessionSettings {
    /// Creates settings with no policy responder.
    #[must_use]
    pub fn new(max_packet: usize, routes: Arc<RouteRegistry>) -> Self {
        Self {
            max_packet,
            routes,
            policy: None,
        }
    }

    /// Enables the Flash policy responder.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn PolicyProvider>) -> Self {
        self.policy = Some(policy);
        self
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("max_packet", &self.max_packet)
            .field("routes", &self.routes.len())
            .field("policy", &self.policy.is_some())
            .finish()
    }
}

// ============================================================================
// Session
// ============================================================================

/// One client connection from upgrade to close.
pub struct Session {
    conn: Connection,
    upstream: Option<Box<dyn Upstream>>,
    negotiator: Negotiator,
    buffer: Vec<u8>,
    settings: SessionSettings,
    finished: bool,
}

impl Session {
    /// Creates a session for a freshly accepted socket.
    #[must_use]
    pub fn new(id: SessionId, peer: Option<SocketAddr>, settings: SessionSettings) -> Self {
        Self {
            conn: Connection::new(id, peer),
            upstream: None,
            negotiator: Negotiator::new(settings.max_packet),
            buffer: Vec::new(),
            settings,
            finished: false,
        }
    }

    /// Creates a session for an upgrade whose request head was parsed by an
    /// HTTP front end.
    ///
    /// Negotiation resumes at the end of the header block: pass the bytes
    /// the front end read past the head (possibly none) to
    /// [`Session::on_data`] to finish the handshake.
    #[must_use]
    pub fn from_request(
        id: SessionId,
        peer: Option<SocketAddr>,
        settings: SessionSettings,
        request: HandshakeRequest,
    ) -> Self {
        let mut conn = Connection::new(id, peer);
        conn.state = SessionState::Handshaking;

        Self {
            conn,
            upstream: None,
            negotiator: Negotiator::resume(request, settings.max_packet),
            buffer: CRLF.to_vec(),
            settings,
            finished: false,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.conn.id()
    }

    /// Lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.conn.state
    }

    /// Handshake negotiation state.
    #[inline]
    #[must_use]
    pub fn handshake_state(&self) -> &HandshakeState {
        self.negotiator.state()
    }

    /// Negotiated protocol generation.
    #[inline]
    #[must_use]
    pub fn variant(&self) -> Option<ProtocolVariant> {
        self.conn.variant
    }

    /// Write handle.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns `true` once the session has been finalized.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.finished
    }

    /// Returns `true` once the socket should be shut down after flushing
    /// the remaining output.
    #[inline]
    #[must_use]
    pub fn wants_close(&self) -> bool {
        self.finished || self.conn.close_requested
    }

    /// Returns `true` while bytes are waiting to be written.
    #[inline]
    #[must_use]
    pub fn has_output(&self) -> bool {
        !self.conn.outbound.is_empty()
    }

    /// Number of received bytes not yet consumed.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Feeds bytes received from the peer.
    ///
    /// Drives the handshake, then decodes and dispatches every complete
    /// frame in order. Incomplete input stays buffered.
    ///
    /// # Errors
    ///
    /// Any handshake or framing error. The session is finalized before the
    /// error is returned; queued output (a close frame, say) can still be
    /// drained with [`Session::take_output`].
    pub fn on_data(&mut self, bytes: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::TransportClosed);
        }

        self.buffer.extend_from_slice(bytes);

        if self.conn.state == SessionState::Connecting && !self.buffer.is_empty() {
            self.conn.state = SessionState::Handshaking;
        }

        match self.process() {
            Ok(()) => {
                if self.conn.close_requested {
                    self.finish();
                }
                Ok(())
            }
            Err(e) => {
                warn!(session = %self.id(), state = %self.conn.state, error = %e, "Closing session");

                if matches!(e, Error::UnmaskedClientFrame) {
                    let payload = modern::close_payload(modern::CLOSE_PROTOCOL_ERROR);
                    if let Ok(bytes) = modern::encode(&payload, Opcode::Close) {
                        self.conn.queue_raw(&bytes);
                    }
                }

                if self.conn.state == SessionState::Handshaking {
                    self.negotiator.fail();
                }
                self.finish();
                Err(e)
            }
        }
    }

    /// Reports that previously taken output has been flushed.
    ///
    /// Runs the callbacks queued before this call in FIFO order, then the
    /// upstream's write hook. Callbacks queued while these run wait for the
    /// next notification.
    pub fn on_write_ready(&mut self) {
        if self.finished {
            return;
        }

        self.conn.write_ready = true;

        let callbacks = std::mem::take(&mut self.conn.callbacks);
        if !callbacks.is_empty() {
            trace!(session = %self.id(), count = callbacks.len(), "Running write callbacks");
        }
        for callback in callbacks {
            callback(&mut self.conn);
        }

        if let Some(upstream) = self.upstream.as_mut() {
            upstream.on_write(&mut self.conn);
        }

        if self.conn.close_requested {
            self.finish();
        }
    }

    /// Takes all bytes queued for writing.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.conn.outbound)
    }

    /// Queues a frame. See [`Connection::send`].
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] before the handshake completes or after close,
    /// or an encoding error.
    pub fn send(&mut self, payload: &[u8], opcode: Opcode) -> Result<()> {
        let result = self.conn.send(payload, opcode);
        if self.conn.close_requested {
            self.finish();
        }
        result
    }

    /// Queues a frame with a completion callback. See
    /// [`Connection::send_then`].
    ///
    /// # Errors
    ///
    /// Same as [`Session::send`].
    pub fn send_then<F>(&mut self, payload: &[u8], opcode: Opcode, callback: F) -> Result<()>
    where
        F: FnOnce(&mut Connection) + Send + 'static,
    {
        let result = self.conn.send_then(payload, opcode, callback);
        if self.conn.close_requested {
            self.finish();
        }
        result
    }

    /// Asks the session to stop for server shutdown.
    ///
    /// Returns `true` if the session finalized (or already was), `false` if
    /// the upstream wants more time.
    pub fn graceful_shutdown(&mut self) -> bool {
        if self.finished {
            return true;
        }

        let ready = self
            .upstream
            .as_mut()
            .is_none_or(|upstream| upstream.graceful_shutdown());

        if ready {
            self.finish();
        } else {
            debug!(session = %self.id(), "Upstream deferred shutdown");
        }
        ready
    }

    /// Finalizes the session. Idempotent.
    ///
    /// Drops pending callbacks and tells the upstream (once) that the
    /// connection is gone. Queued output stays available.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        self.conn.state = SessionState::Closing;
        self.conn.close_requested = true;
        self.conn.callbacks.clear();
        self.buffer.clear();

        if let Some(mut upstream) = self.upstream.take() {
            upstream.on_finish();
        }

        self.conn.state = SessionState::Closed;
        debug!(session = %self.id(), "Session finished");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn process(&mut self) -> Result<()> {
        if self.conn.state == SessionState::Handshaking {
            if self.serve_policy() {
                return Ok(());
            }

            match self.negotiator.advance(&mut self.buffer)? {
                Progress::Pending => return Ok(()),
                Progress::Ready(upgrade) => self.complete_handshake(upgrade)?,
            }
        }

        if self.conn.state == SessionState::Open {
            self.drain_frames()?;
        }

        Ok(())
    }

    /// Answers a Flash policy request. Returns `true` if one was served.
    fn serve_policy(&mut self) -> bool {
        let Some(provider) = self.settings.policy.as_ref() else {
            return false;
        };

        if self.negotiator.request().is_some() || !policy::is_policy_request(&self.buffer) {
            return false;
        }

        if let Some(data) = provider.policy_data() {
            self.conn.queue_raw(data.as_bytes());
            self.conn.queue_raw(&[0]);
        }

        info!(session = %self.id(), "Served policy file");
        self.finish();
        true
    }

    fn complete_handshake(&mut self, upgrade: Upgrade) -> Result<()> {
        let request = self
            .negotiator
            .request()
            .cloned()
            .ok_or_else(|| Error::malformed_handshake("no request parsed"))?;
        let route = request.route_name().to_string();

        self.conn.request = Some(request);
        self.conn.variant = Some(upgrade.variant);

        let factory = self
            .settings
            .routes
            .resolve(&route)
            .ok_or_else(|| Error::upstream_rejected(format!("undefined route '{route}'")))?;

        let mut upstream = factory(&self.conn).ok_or_else(|| {
            Error::upstream_rejected(format!("route '{route}' declined the connection"))
        })?;

        let accepted = upstream.on_handshake(&self.conn);
        self.upstream = Some(upstream);
        if !accepted {
            return Err(Error::upstream_rejected(format!(
                "upstream for route '{route}' refused the handshake"
            )));
        }

        self.conn.queue_raw(&upgrade.reply);
        self.negotiator.complete();
        self.conn.state = SessionState::Open;

        info!(
            session = %self.id(),
            variant = %upgrade.variant,
            route = %route,
            "WebSocket session open"
        );
        Ok(())
    }

    fn drain_frames(&mut self) -> Result<()> {
        let Some(variant) = self.conn.variant else {
            return Err(Error::invalid_frame("no protocol negotiated"));
        };

        while self.conn.state == SessionState::Open && !self.conn.close_requested {
            match variant.decode(&self.buffer, self.settings.max_packet)? {
                Decoded::NeedMore => break,
                Decoded::Frame { frame, consumed } => {
                    self.buffer.drain(..consumed);
                    self.dispatch(frame);
                }
            }
        }

        Ok(())
    }

    fn dispatch(&mut self, frame: Frame) {
        trace!(
            session = %self.id(),
            opcode = %frame.opcode,
            len = frame.payload.len(),
            "Frame received"
        );

        let handled = match self.upstream.as_mut() {
            Some(upstream) => upstream.on_frame(&mut self.conn, frame),
            None => false,
        };

        if !handled {
            debug!(session = %self.id(), "Frame not handled by upstream");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("conn", &self.conn)
            .field("handshake", self.negotiator.state())
            .field("buffered", &self.buffer.len())
            .field("upstream", &self.upstream.is_some())
            .field("finished", &self.finished)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
