//! Process configuration. Everything is a compile-time constant; there is
//! no CLI and no config file.

use std::time::Duration;

/// Discord application id for the relay.
pub const DISCORD_APP_ID: i64 = 1104911583291376680;

/// Address the Plex webhook listener binds to.
pub const WEBHOOK_BIND: &str = "0.0.0.0:8015";

/// Address the viewer fan-out listener binds to.
pub const FANOUT_BIND: &str = "0.0.0.0:8016";

/// URL the remote viewer connects to.
pub const FANOUT_URL: &str = "ws://127.0.0.1:8016";

/// Whether to look up album art on Last.fm when publishing.
pub const ENRICHMENT_ENABLED: bool = true;

/// Last.fm API key used for album art lookups.
pub const LASTFM_API_KEY: &str = "YOUR_LASTFM_API_KEY";

/// How long a `Stop` waits before the presence status is actually
/// cleared. Players routinely emit `Stop` then `Play` for the next queued
/// track; clearing inside this window would flicker the status.
pub const DEBOUNCE_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_app_id: i64,
    pub webhook_bind: String,
    pub fanout_bind: String,
    pub fanout_url: String,
    pub enrichment_enabled: bool,
    pub lastfm_api_key: String,
    pub debounce_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_app_id: DISCORD_APP_ID,
            webhook_bind: WEBHOOK_BIND.to_string(),
            fanout_bind: FANOUT_BIND.to_string(),
            fanout_url: FANOUT_URL.to_string(),
            enrichment_enabled: ENRICHMENT_ENABLED,
            lastfm_api_key: LASTFM_API_KEY.to_string(),
            debounce_delay: DEBOUNCE_DELAY,
        }
    }
}
