//! Echo and broadcast-counter server.
//!
//! Demonstrates:
//! - Registering upstream factories under route names
//! - Echoing frames back to the sender
//! - Write callbacks chained after a flush
//! - Optional Flash policy responder
//! - Graceful shutdown on Ctrl+C
//!
//! Usage:
//!   cargo run --example echo_server
//!   cargo run --example echo_server -- --port 9000
//!   cargo run --example echo_server -- --debug
//!   cargo run --example echo_server -- --policy
//!
//! Then connect to `ws://127.0.0.1:8047/echo` or `ws://127.0.0.1:8047/count`.

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::Args;
use tracing::info;
use websocket_server::{
    Connection, Frame, Opcode, Result, RouteRegistry, ServerConfig, SessionSettings,
    StaticPolicy, Upstream, WebSocketServer,
};

// ============================================================================
// Constants
// ============================================================================

const POLICY: &str = "<cross-domain-policy>\
    <allow-access-from domain=\"*\" to-ports=\"*\"/>\
    </cross-domain-policy>";

// ============================================================================
// Upstreams
// ============================================================================

/// Sends every frame back unchanged.
struct Echo;

impl Upstream for Echo {
    fn on_frame(&mut self, conn: &mut Connection, frame: Frame) -> bool {
        conn.send(&frame.payload, frame.opcode).is_ok()
    }

    fn on_finish(&mut self) {
        info!("Echo client left");
    }
}

/// Replies with a global message counter, then a confirmation once the
/// reply has been written.
struct Counter {
    total: Arc<AtomicU64>,
}

impl Upstream for Counter {
    fn on_frame(&mut self, conn: &mut Connection, frame: Frame) -> bool {
        if frame.opcode != Opcode::Text {
            return false;
        }

        let n = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        conn.send_then(n.to_string().as_bytes(), Opcode::Text, |conn| {
            let _ = conn.send(b"flushed", Opcode::Text);
        })
        .is_ok()
    }

    fn on_handshake(&mut self, conn: &Connection) -> bool {
        info!(
            session = %conn.id(),
            user = conn.cookie("user").unwrap_or("anonymous"),
            "Counter client joined"
        );
        true
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Echo Server ===\n");

    // ========================================================================
    // Routes
    // ========================================================================

    let routes = Arc::new(RouteRegistry::new());
    routes.set(
        "echo",
        Arc::new(|_: &Connection| Some(Box::new(Echo) as Box<dyn Upstream>)),
    );

    let total = Arc::new(AtomicU64::new(0));
    routes.set(
        "count",
        Arc::new(move |_: &Connection| {
            Some(Box::new(Counter {
                total: Arc::clone(&total),
            }) as Box<dyn Upstream>)
        }),
    );

    println!("[1] Routes: /echo, /count");

    // ========================================================================
    // Listener
    // ========================================================================

    let config = ServerConfig::builder()
        .listen(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .listen_port(args.port)
        .max_allowed_packet_size("64k")
        .enable(true)
        .build()?;

    let mut settings = SessionSettings::new(config.max_allowed_packet, routes);
    if args.policy {
        settings = settings.with_policy(Arc::new(StaticPolicy(POLICY.to_string())));
        println!("    Flash policy responder enabled");
    }

    let server = WebSocketServer::bind_with_settings(config, settings).await?;
    println!("[2] Listening on {}\n", server.ws_url());

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Shutdown
    // ========================================================================

    println!("\n[3] Shutting down ({} sessions)...", server.connection_count());
    server.shutdown().await;
    println!("    ✓ Done");

    Ok(())
}
