//! Normalizes raw Plex webhook payloads into canonical playback facts.

use serde::Deserialize;

use crate::error::RelayError;

/// What a playback event means, independent of the wire spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Play,
    Resume,
    Pause,
    Stop,
    Scrobble,
    Unknown,
}

impl EventKind {
    fn from_event(event: &str) -> Self {
        match event {
            "media.play" => Self::Play,
            "media.resume" => Self::Resume,
            "media.pause" => Self::Pause,
            "media.stop" => Self::Stop,
            "media.scrobble" => Self::Scrobble,
            _ => Self::Unknown,
        }
    }

    /// Kinds that describe a track actively being listened to.
    pub fn is_now_playing(self) -> bool {
        matches!(self, Self::Play | Self::Resume | Self::Scrobble)
    }
}

/// Canonical snapshot of a single playback event. Constructed once per
/// inbound event, immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackFact {
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub server_label: String,
    pub kind: EventKind,
}

impl PlaybackFact {
    /// A data-free fact for control events (pause/stop relayed without
    /// track metadata).
    pub fn control(kind: EventKind) -> Self {
        Self {
            title: String::new(),
            artists: Vec::new(),
            album: None,
            server_label: String::new(),
            kind,
        }
    }
}

/// The JSON document inside the webhook's form-encoded `payload` field.
/// Everything is optional at the wire level; `normalize` decides what is
/// actually required.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub event: Option<String>,
    #[serde(rename = "Server")]
    pub server: Option<ServerInfo>,
    #[serde(rename = "Metadata")]
    pub metadata: Option<MediaMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct ServerInfo {
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaMetadata {
    pub title: Option<String>,
    /// Only present when the track artist differs from the directory
    /// artist, e.g. compilation albums. Preferred when present.
    #[serde(rename = "originalTitle")]
    pub original_title: Option<String>,
    #[serde(rename = "grandparentTitle")]
    pub grandparent_title: Option<String>,
    #[serde(rename = "parentTitle")]
    pub parent_title: Option<String>,
}

/// Turn a raw payload into a `PlaybackFact`.
///
/// Fails with `MalformedPayload` when the event, server title, or media
/// title is absent, or when a now-playing event carries no artist at all.
/// Unknown event strings are not an error; they map to
/// `EventKind::Unknown` and are ignored downstream.
pub fn normalize(payload: WebhookPayload) -> Result<PlaybackFact, RelayError> {
    let event = payload
        .event
        .ok_or_else(|| RelayError::MalformedPayload("missing event".into()))?;
    let server_label = payload
        .server
        .and_then(|s| s.title)
        .ok_or_else(|| RelayError::MalformedPayload("missing Server.title".into()))?;
    let metadata = payload
        .metadata
        .ok_or_else(|| RelayError::MalformedPayload("missing Metadata".into()))?;

    let kind = EventKind::from_event(&event);
    if kind == EventKind::Unknown {
        tracing::info!(%event, "unknown webhook event");
    }

    let title = match metadata.title {
        Some(t) if !t.is_empty() => t,
        Some(_) => "Unknown Title".to_string(),
        None => return Err(RelayError::MalformedPayload("missing Metadata.title".into())),
    };

    let artists = metadata
        .original_title
        .filter(|s| !s.is_empty())
        .or(metadata.grandparent_title.filter(|s| !s.is_empty()))
        .map(|raw| split_artists(&raw))
        .unwrap_or_default();

    if kind.is_now_playing() && artists.is_empty() {
        return Err(RelayError::MalformedPayload(
            "now-playing event without an artist".into(),
        ));
    }

    let album = metadata.parent_title.filter(|s| !s.is_empty());

    Ok(PlaybackFact {
        title,
        artists,
        album,
        server_label,
        kind,
    })
}

/// Split a semicolon-joined artist list, preserving order.
pub fn split_artists(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
