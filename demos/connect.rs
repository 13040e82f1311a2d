//! Connect, join a topic and watch the session.
//!
//! Demonstrates:
//! - Building a socket with connect params
//! - Following session events with a loading signal
//! - Joining a channel and printing server pushes
//! - Disconnecting cleanly
//!
//! Usage:
//!   cargo run --example connect
//!   cargo run --example connect -- --url http://localhost:4000/live
//!   cargo run --example connect -- --no-fallback --debug
//!   cargo run --example connect -- --no-wait

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use live_socket::{
    CloseCode, LiveSocket, LoadingSignal, Result, SessionEvent, SocketConfig,
};
use serde_json::json;

// ============================================================================
// Constants
// ============================================================================

const TOPIC: &str = "lv:demo";
const OPEN_TIMEOUT: Duration = Duration::from_secs(30);

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
    println!("=== Connect ===\n");

    // ========================================================================
    // Build Socket
    // ========================================================================

    println!("[1] Building socket...");
    println!("    URL: {}", args.url);

    let socket = LiveSocket::builder(&args.url)
        .config(SocketConfig::new().with_fallback(!args.no_fallback))
        .param("_csrf_token", "demo-token")
        .param("_request_id", "demo-request")
        .build()?;

    println!("    ✓ Socket ready\n");

    // ========================================================================
    // Observe Session
    // ========================================================================

    let loading = LoadingSignal::new();
    loading.follow(&socket);

    let mut events = socket.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::FallbackEngaged { from, to, attempts } => {
                    println!("    ! Fallback {from} → {to} after {attempts} attempt(s)");
                }
                SessionEvent::Reconnecting { kind, attempt, delay } => {
                    println!("    ~ Reconnecting over {kind} (#{attempt}) in {delay:?}");
                }
                other => println!("    · {other:?}"),
            }
        }
    });

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[2] Connecting...");
    socket.connect()?;

    let kind = match tokio::time::timeout(OPEN_TIMEOUT, socket.wait_until_open()).await {
        Ok(result) => result?,
        Err(_) => {
            println!("    ✗ Not open after {OPEN_TIMEOUT:?}");
            socket.teardown();
            return Ok(());
        }
    };

    println!("    ✓ Open over {kind}");
    println!("    Loading: {}\n", loading.state());

    // ========================================================================
    // Join Channel
    // ========================================================================

    println!("[3] Joining {TOPIC}...");

    let mut channel = socket.channel(TOPIC, json!({}));
    match channel.join().await {
        Ok(response) => println!("    ✓ Joined: {response}\n"),
        Err(e) => println!("    ✗ Join failed: {e}\n"),
    }

    if channel.is_joined() {
        tokio::spawn(async move {
            while let Some(message) = channel.recv().await {
                println!("    ← {} {}", message.event, message.payload);
            }
        });
    }

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Disconnect
    // ========================================================================

    println!("\n[4] Disconnecting...");
    socket.disconnect(CloseCode::NORMAL, "demo finished")?;
    println!("    ✓ Done");

    Ok(())
}
