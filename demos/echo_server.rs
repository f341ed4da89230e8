//! Echo service over WebSocket sessions.
//!
//! Demonstrates:
//! - Binding a `SessionServer` with custom session options
//! - Echoing every inbound message through the session's data handler
//! - Greeting each session from the open handler
//! - Shutting down with `c[3000,"Go away!"]` on Ctrl+C
//!
//! Usage:
//!   cargo run --example echo_server
//!   cargo run --example echo_server -- --debug
//!   cargo run --example echo_server -- --port 9999
//!
//! Then connect with any WebSocket client and send `["hello"]`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sockjs_session::{Result, ServerOptions, Session, SessionOptions, SessionServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    port: u16,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let port = args
            .iter()
            .position(|a| a == "--port")
            .and_then(|i| args.get(i + 1))
            .and_then(|p| p.parse().ok())
            .unwrap_or(8081);
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            port,
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Echo Server ===\n");

    let options = ServerOptions::new()
        .with_port(args.port)
        .with_session_options(
            SessionOptions::new()
                .with_heartbeat_period(Duration::from_secs(10))
                .with_timeout(Duration::from_secs(5)),
        );

    let server = SessionServer::bind(options, on_open).await?;

    println!("    ✓ Listening on {}", server.ws_url());
    println!("    Press Ctrl+C to stop\n");

    tokio::signal::ctrl_c().await?;

    println!("\n[Shutdown] {} live session(s)", server.session_count());
    server.shutdown();

    Ok(())
}

fn on_open(session: Session) {
    info!(session_id = %session.id(), "Client connected");
    session.write(format!("welcome {}", session.id()));

    let echo = session.clone();
    session.data_handler(Some(Arc::new(move |chunk: Bytes| {
        info!(session_id = %echo.id(), bytes = chunk.len(), "Echoing");
        echo.write(chunk);
    })));
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "sockjs_session=trace,echo_server=debug"
    } else {
        "sockjs_session=info,echo_server=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
