//! Headless viewer that keeps one camera connection alive
//!
//! Run with: cargo run --example viewer --features webrtc-engine -- <SIGNALING_URL> <CAMERA_ID> [USER]
//!
//! Examples:
//!   cargo run --example viewer --features webrtc-engine -- wss://signal.example.com/ws 42
//!   RUST_LOG=viewlink=debug cargo run --example viewer --features webrtc-engine -- ws://localhost:8080 7 bob
//!
//! The viewer registers as `viewer:<USER>:<CAMERA_ID>:` and logs every state
//! change and received track until Ctrl+C.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use viewlink::peer::WebRtcEngine;
use viewlink::{ConnectionStore, IceServer, StreamKey, WebRtcConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("viewlink=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(url), Some(camera)) = (args.next(), args.next()) else {
        eprintln!("usage: viewer <SIGNALING_URL> <CAMERA_ID> [USER]");
        std::process::exit(2);
    };
    let user = args.next().unwrap_or_else(|| "demo".to_string());

    let engine = Arc::new(WebRtcEngine::new()?);
    let store = ConnectionStore::new(engine);

    let config = WebRtcConfig::new(url, format!("viewer:{}:{}:", user, camera))
        .ice_server(IceServer::new("stun:stun.l.google.com:19302"));
    let key = StreamKey::camera(&camera);

    let handle = store.acquire(key.clone(), config, true).await?;
    let _subscription = handle.subscribe(move |snapshot| {
        tracing::info!(
            state = %snapshot.state,
            attempts = snapshot.reconnect_attempts,
            error = snapshot.error.as_deref().unwrap_or(""),
            "Connection update"
        );
        if let Some(media) = &snapshot.media {
            for track in media.tracks() {
                tracing::info!(track = %track.id(), kind = ?track.kind(), "Receiving track");
            }
        }
    });

    tokio::signal::ctrl_c().await?;

    let stats = handle.stats();
    tracing::info!(
        stream = %key,
        sessions = stats.sessions_started,
        reconnects = stats.reconnects_scheduled,
        pings = stats.pings_sent,
        pongs = stats.pongs_received,
        "Shutting down"
    );
    store.dispose_all().await;
    Ok(())
}
