//! Chat relay server example
//!
//! Run with: cargo run --example chat_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example chat_server                    # binds to 0.0.0.0:50051
//!   cargo run --example chat_server localhost          # binds to 127.0.0.1:50051
//!   cargo run --example chat_server 127.0.0.1:7000     # binds to 127.0.0.1:7000
//!
//! ## Chatting
//!
//! With netcat (one terminal per user):
//!   nc localhost 50051
//!   JOIN alice
//!   SAY hello everyone
//!   LEAVE
//!
//! ## Features
//!
//! - History replay: joiners receive the last 100 messages, then the live tail
//! - Slow consumers: a client that stops reading loses its oldest queued
//!   messages (reported with DROPPED) instead of stalling everyone else
//! - Presence: join/leave notices from the `*` sender

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_relay::{ChatServer, RelayConfig, ServerConfig};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:50051
/// - "localhost:7000" -> 127.0.0.1:7000
/// - "127.0.0.1" -> 127.0.0.1:50051
/// - "0.0.0.0:7000" -> 0.0.0.0:7000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 50051;

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
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:50051)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = ServerConfig::default();
    if let Some(addr_str) = args.get(1) {
        match parse_bind_addr(addr_str) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_relay=debug".parse()?)
                .add_directive("chat_server=debug".parse()?),
        )
        .init();

    println!("Starting chat relay on {}", config.bind_addr);
    println!("Connect with: nc {} {}", config.bind_addr.ip(), config.bind_addr.port());
    println!();

    let relay_config = RelayConfig::default().announce_presence(true);
    let server = Arc::new(ChatServer::with_relay_config(config, relay_config));

    // Periodic stats
    let stats_server = Arc::clone(&server);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let relay = stats_server.broadcaster().stats().await;
            let server = stats_server.stats();
            tracing::info!(
                connections = server.active_connections,
                subscribers = relay.subscriber_count,
                published = relay.total_published,
                history = relay.history_len,
                dropped = relay.total_dropped,
                "Relay stats"
            );
        }
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    Ok(())
}
