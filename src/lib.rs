//! WebSocket server - protocol engine for legacy and RFC 6455 clients.
//!
//! This library accepts WebSocket upgrades, negotiates one of two protocol
//! generations, and dispatches decoded frames to application handlers
//! selected by URL route.
//!
//! # Architecture
//!
//! The engine is split into a sans-IO core and a thin tokio host:
//!
//! - **Protocol**: handshake negotiation and the two frame codecs, byte
//!   buffers in, frames and replies out
//! - **Session**: per-connection state machine owning the receive buffer,
//!   the outbound queue and the attached [`Upstream`]
//! - **Server**: TCP listener running one task per connection
//!
//! Key design principles:
//!
//! - The protocol generation is chosen once, at handshake time
//! - Route name (first path segment) selects an upstream factory
//! - Partial input is buffered until a whole line or frame is available
//! - Finalization is idempotent and notifies the upstream exactly once
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use websocket_server::{
//!     Connection, Frame, Result, RouteRegistry, ServerConfig, Upstream, WebSocketServer,
//! };
//!
//! struct Echo;
//!
//! impl Upstream for Echo {
//!     fn on_frame(&mut self, conn: &mut Connection, frame: Frame) -> bool {
//!         conn.send(&frame.payload, frame.opcode).is_ok()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let routes = Arc::new(RouteRegistry::new());
//!     routes.set("echo", Arc::new(|_: &Connection| {
//!         Some(Box::new(Echo) as Box<dyn Upstream>)
//!     }));
//!
//!     let config = ServerConfig::builder().enable(true).build()?;
//!     let server = WebSocketServer::bind(config, routes).await?;
//!     println!("Listening on {}/echo", server.ws_url());
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Handshake and frame codecs (sans-IO) |
//! | [`session`] | Per-connection state machine and upstream trait |
//! | [`server`] | Configuration, route registry, tokio listener |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// WebSocket wire protocol: handshake negotiation and frame codecs.
pub mod protocol;

/// Per-connection session state machine.
///
/// - [`Session`] - drives one connection
/// - [`Connection`] - write handle given to upstreams
/// - [`Upstream`] - application handler trait
pub mod session;

/// Listener, configuration and route registry.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::SessionId;

// Protocol types
pub use protocol::{Frame, HandshakeRequest, HandshakeState, Opcode, ProtocolVariant};

// Session types
pub use session::{
    Connection, PolicyProvider, Session, SessionSettings, SessionState, StaticPolicy, Upstream,
    UpstreamFactory,
};

// Server types
pub use server::{RouteRegistry, ServerConfig, ServerConfigBuilder, WebSocketServer};
