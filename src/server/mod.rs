//! TCP listener driving WebSocket sessions.
//!
//! One tokio task per accepted socket owns its [`Session`]; reads, writes
//! and write-ready notifications are serialized inside that task.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            WebSocketServer               │
//! │  accept loop ──spawn──► connection task  │
//! │                          │ Session       │
//! │  RouteRegistry ◄─resolve─┘ Upstream      │
//! │  sessions: SessionId → SocketAddr        │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | `ServerConfig` and its builder |
//! | `routes` | Route name to upstream factory registry |

// ============================================================================
// Submodules
// ============================================================================

/// Listener configuration.
pub mod config;

/// Route registry.
pub mod routes;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ServerConfig, ServerConfigBuilder, parse_size};
pub use routes::RouteRegistry;

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::session::{Session, SessionSettings};

// ============================================================================
// Constants
// ============================================================================

/// Accept timeout so the loop can observe the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Delay before asking a deferring upstream again during shutdown.
const SHUTDOWN_RETRY: Duration = Duration::from_millis(100);

/// Socket read size.
const READ_CHUNK: usize = 8192;

// ============================================================================
// WebSocketServer
// ============================================================================

/// Listens for WebSocket clients and runs a session per connection.
///
/// # Example
///
/// ```ignore
/// let routes = Arc::new(RouteRegistry::new());
/// routes.set("echo", Arc::new(|_: &Connection| Some(Box::new(Echo) as Box<dyn Upstream>)));
///
/// let config = ServerConfig::builder().enable(true).build()?;
/// let server = WebSocketServer::bind(config, routes).await?;
/// println!("Listening on {}", server.ws_url());
///
/// server.shutdown().await;
/// ```
pub struct WebSocketServer {
    /// Bound address.
    local_addr: SocketAddr,

    /// Shared by every session.
    settings: SessionSettings,

    /// Live sessions.
    sessions: Mutex<FxHashMap<SessionId, SocketAddr>>,

    /// Stops the accept loop.
    shutdown: AtomicBool,

    /// Tells connection tasks to shut their sessions down.
    shutdown_tx: watch::Sender<bool>,
}

// ============================================================================
// WebSocketServer - Constructor
// ============================================================================

impl WebSocketServer {
    /// Binds the configured address and starts the accept loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is disabled or invalid
    /// - [`Error::Io`] if binding fails
    pub async fn bind(config: ServerConfig, routes: Arc<RouteRegistry>) -> Result<Arc<Self>> {
        let settings = SessionSettings::new(config.max_allowed_packet, routes);
        Self::bind_with_settings(config, settings).await
    }

    /// Like [`WebSocketServer::bind`], with explicit session settings (for a
    /// policy responder, say).
    ///
    /// `settings.max_packet` wins over `config.max_allowed_packet`.
    ///
    /// # Errors
    ///
    /// Same as [`WebSocketServer::bind`].
    pub async fn bind_with_settings(
        config: ServerConfig,
        settings: SessionSettings,
    ) -> Result<Arc<Self>> {
        if !config.enable {
            return Err(Error::config(
                "WebSocket server is disabled. Use .enable(true) to start it.",
            ));
        }
        config.validate()?;

        let listener = TcpListener::bind(config.socket_addr()).await?;
        let local_addr = listener.local_addr()?;

        debug!(addr = %local_addr, "WebSocket server bound");

        let (shutdown_tx, _) = watch::channel(false);
        let server = Arc::new(Self {
            local_addr,
            settings,
            sessions: Mutex::new(FxHashMap::default()),
            shutdown: AtomicBool::new(false),
            shutdown_tx,
        });

        let server_clone = Arc::clone(&server);
        tokio::spawn(async move {
            server_clone.accept_loop(listener).await;
        });

        info!(addr = %local_addr, routes = server.settings.routes.len(), "WebSocket server started");

        Ok(server)
    }
}

// ============================================================================
// WebSocketServer - Public API
// ============================================================================

impl WebSocketServer {
    /// Bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// URL clients can connect to. Unspecified bind addresses map to
    /// loopback.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let ip = match self.local_addr.ip() {
            ip if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            ip => ip,
        };
        format!("ws://{}", SocketAddr::new(ip, self.port()))
    }

    /// Number of live sessions.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Live sessions and their peers.
    #[must_use]
    pub fn sessions(&self) -> Vec<(SessionId, SocketAddr)> {
        self.sessions
            .lock()
            .iter()
            .map(|(id, addr)| (*id, *addr))
            .collect()
    }

    /// Route registry shared with the sessions.
    #[inline]
    #[must_use]
    pub fn routes(&self) -> &Arc<RouteRegistry> {
        &self.settings.routes
    }

    /// Returns `true` once [`WebSocketServer::shutdown`] was called.
    #[inline]
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

// ============================================================================
// WebSocketServer - Lifecycle
// ============================================================================

impl WebSocketServer {
    /// Stops accepting and shuts every session down gracefully.
    ///
    /// Sessions whose upstream defers are asked again until they agree, so
    /// this returns only once every session has finished.
    pub async fn shutdown(&self) {
        info!(sessions = self.connection_count(), "WebSocket server shutting down");

        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);

        while self.connection_count() > 0 {
            sleep(SHUTDOWN_RETRY).await;
        }

        info!("WebSocket server shutdown complete");
    }
}

// ============================================================================
// WebSocketServer - Accept Loop
// ============================================================================

impl WebSocketServer {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("Accept loop shutting down");
                break;
            }

            match timeout(ACCEPT_POLL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            if e.is_fatal_to_connection() {
                                warn!(error = %e, %addr, "Connection closed with error");
                            } else {
                                debug!(error = %e, %addr, "Connection ended");
                            }
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Runs one session until either side closes.
    async fn handle_connection(&self, mut stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let id = SessionId::next();
        debug!(session = %id, %addr, "New TCP connection");

        self.sessions.lock().insert(id, addr);

        let mut session = Session::new(id, Some(addr), self.settings.clone());
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let result = drive(&mut session, &mut stream, &mut shutdown_rx).await;

        session.finish();
        let _ = stream.shutdown().await;
        self.sessions.lock().remove(&id);

        debug!(session = %id, %addr, "Connection closed");
        result
    }
}

// ============================================================================
// Connection Task
// ============================================================================

/// Pumps bytes between the socket and the session.
async fn drive(
    session: &mut Session,
    stream: &mut TcpStream,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<()> {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut shutting_down = *shutdown_rx.borrow();

    loop {
        flush(session, stream).await?;

        if session.wants_close() {
            return Ok(());
        }

        if shutting_down && session.graceful_shutdown() {
            flush(session, stream).await?;
            return Ok(());
        }

        tokio::select! {
            read = stream.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    debug!(session = %session.id(), "Peer closed the connection");
                    return Ok(());
                }

                if let Err(e) = session.on_data(&buf[..n]) {
                    flush(session, stream).await?;
                    return Err(e);
                }
            }
            _ = shutdown_rx.changed(), if !shutting_down => {
                shutting_down = true;
            }
            () = sleep(SHUTDOWN_RETRY), if shutting_down => {}
        }
    }
}

/// Writes queued output and reports write readiness until the session
/// stops producing bytes.
async fn flush(session: &mut Session, stream: &mut TcpStream) -> Result<()> {
    while session.has_output() {
        let output = session.take_output();
        stream.write_all(&output).await?;
        session.on_write_ready();
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
