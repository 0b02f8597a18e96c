//! Remote viewer: mirrors the relay's presence on another machine.
//!
//! Connects to the relay's fan-out socket and drives a local Discord
//! status through the same session engine the relay uses, so the
//! mirrored status gets identical debounce and slot behavior.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_tungstenite::connect_async;

use plexcord::artwork::ArtworkResolver;
use plexcord::config::Config;
use plexcord::discord::{DiscordPresence, DiscordState};
use plexcord::fanout::ViewerEvent;
use plexcord::logging;
use plexcord::presence::PresenceSink;
use plexcord::session::SessionEngine;

#[tokio::main]
async fn main() {
    let _guard = logging::init("plexcord-viewer");
    let config = Config::default();

    let discord = Arc::new(DiscordState::init(config.discord_app_id));
    let sink = Arc::new(PresenceSink::new(Box::new(DiscordPresence::new(
        Arc::clone(&discord),
    ))));

    let resolver = config
        .enrichment_enabled
        .then(|| Arc::new(ArtworkResolver::new(config.lastfm_api_key.clone())));

    let engine = Arc::new(SessionEngine::new(
        sink,
        resolver,
        config.debounce_delay,
        tokio::runtime::Handle::current(),
    ));

    tracing::info!("Connecting to relay at {}", config.fanout_url);
    let (socket, _) = match connect_async(config.fanout_url.as_str()).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::error!("Failed to connect to relay: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Connected to relay");

    let (_, mut rx) = socket.split();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            message = rx.next() => match message {
                Some(Ok(message)) if message.is_text() => {
                    let text = match message.into_text() {
                        Ok(text) => text,
                        Err(_) => continue,
                    };
                    match serde_json::from_str::<ViewerEvent>(&text) {
                        Ok(event) => engine.handle(event.into_fact()),
                        Err(e) => tracing::warn!("Undecodable relay event: {}", e),
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Relay connection error: {}", e);
                    break;
                }
                None => {
                    tracing::info!("Relay closed the connection");
                    break;
                }
            },
        }
    }

    engine.shutdown();
    discord.close().await;
}
