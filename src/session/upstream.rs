//! Application-side capability set attached to a session.
//!
//! An [`Upstream`] receives decoded frames for one connection. Upstreams are
//! produced per connection by an [`UpstreamFactory`] registered under a route
//! name; the first path segment of the upgrade request selects the route.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::protocol::Frame;

use super::Connection;

// ============================================================================
// Types
// ============================================================================

/// Builds the upstream for a freshly negotiated connection.
///
/// Returning `None` rejects the connection: no handshake reply is sent and
/// the socket is closed.
pub type UpstreamFactory = Arc<dyn Fn(&Connection) -> Option<Box<dyn Upstream>> + Send + Sync>;

/// Continuation run once the bytes of a queued frame have been flushed.
pub type WriteCallback = Box<dyn FnOnce(&mut Connection) + Send>;

// ============================================================================
// Upstream
// ============================================================================

/// Message handler for one WebSocket connection.
///
/// All methods run on the connection's task, one at a time.
pub trait Upstream: Send {
    /// Called for every decoded frame, in arrival order.
    ///
    /// Replies can be queued with [`Connection::send`]. The return value
    /// reports whether the frame was handled; it is only logged.
    fn on_frame(&mut self, conn: &mut Connection, frame: Frame) -> bool;

    /// Last chance to refuse a wire-valid handshake.
    ///
    /// Runs before the handshake reply is written, so the connection is not
    /// open yet and sends are rejected.
    fn on_handshake(&mut self, conn: &Connection) -> bool {
        let _ = conn;
        true
    }

    /// Called after queued write callbacks have run on write readiness.
    fn on_write(&mut self, conn: &mut Connection) {
        let _ = conn;
    }

    /// Asked during server shutdown. `false` defers the shutdown; the host
    /// asks again later.
    fn graceful_shutdown(&mut self) -> bool {
        true
    }

    /// The connection is gone. Called at most once.
    fn on_finish(&mut self) {}
}
