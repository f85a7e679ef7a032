//! Simple fan-out chat server example
//!
//! Run with: cargo run --example chat_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example chat_server                    # binds to 0.0.0.0:9001
//!   cargo run --example chat_server localhost          # binds to 127.0.0.1:9001
//!   cargo run --example chat_server 127.0.0.1:9002     # binds to 127.0.0.1:9002
//!
//! ## Talking to it
//!
//! With websocat:
//!   websocat ws://localhost:9001
//!
//! Then send JSON envelopes:
//!   {"type":"chat","content":"hello everyone"}
//!   {"type":"notification","content":"ping me back"}
//!   {"type":"notification","content":"psst","targetId":"2"}
//!
//! `chat` is broadcast to every other connected client; `notification`
//! without a target is echoed back as an ack; a bad `type` or malformed
//! JSON gets a structured `error` reply. Clients that stop answering
//! pings are evicted within two sweep intervals.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ws_fanout::{ClientCtx, ServerConfig, ServerHandler, WsServer};

/// Handler that logs connection lifecycle and counts clients
struct LoggingHandler {
    connects: AtomicU64,
}

impl LoggingHandler {
    fn new() -> Self {
        Self {
            connects: AtomicU64::new(0),
        }
    }
}

impl ServerHandler for LoggingHandler {
    async fn authorize(&self, peer_addr: SocketAddr) -> bool {
        // Accept everyone; a real deployment checks a token here
        println!("authorizing {}", peer_addr);
        true
    }

    async fn on_connect(&self, ctx: &ClientCtx) {
        let n = self.connects.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[{}] connected from {} ({} total)", ctx.id, ctx.peer_addr, n);
    }

    async fn on_disconnect(&self, ctx: &ClientCtx) {
        println!("[{}] disconnected", ctx.id);
    }
}

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:9001
/// - "localhost:9002" -> 127.0.0.1:9002
/// - "127.0.0.1" -> 127.0.0.1:9001
/// - "0.0.0.0:9001" -> 0.0.0.0:9001
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 9001;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: chat_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:9001)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => "0.0.0.0:9001".parse().unwrap(),
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ws_fanout=debug".parse()?)
                .add_directive("chat_server=debug".parse()?),
        )
        .init();

    let config = ServerConfig::with_addr(bind_addr)
        .ping_interval(Duration::from_secs(30))
        .max_connections(1024);

    println!("Starting chat server on {}", config.bind_addr);
    println!();
    println!("Connect:  websocat ws://localhost:{}", bind_addr.port());
    println!("Then try: {{\"type\":\"chat\",\"content\":\"hi\"}}");
    println!();

    let server = Arc::new(WsServer::new(config, LoggingHandler::new()));

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    let stats = server.stats();
    println!(
        "Served {} connections, routed {} messages, evicted {}",
        stats.total_connections, stats.messages_routed, stats.evictions
    );

    Ok(())
}
