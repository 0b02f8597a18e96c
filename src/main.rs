use std::sync::Arc;

use tokio::sync::broadcast;

use plexcord::artwork::ArtworkResolver;
use plexcord::config::Config;
use plexcord::discord::{DiscordPresence, DiscordState};
use plexcord::presence::PresenceSink;
use plexcord::session::SessionEngine;
use plexcord::webhook::WebhookServer;
use plexcord::{fanout, logging};

#[tokio::main]
async fn main() {
    let _guard = logging::init("plexcord");
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

    let (events_tx, _) = broadcast::channel(64);
    tokio::spawn(fanout::serve(
        config.fanout_bind.clone(),
        events_tx.clone(),
        Arc::clone(&engine),
    ));

    if let Err(e) = WebhookServer::start(&config.webhook_bind, Arc::clone(&engine), events_tx) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }

    tracing::info!("Shutting down");
    engine.shutdown();
    discord.close().await;
}
