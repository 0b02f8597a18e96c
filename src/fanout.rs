//! Mirrors normalized playback events to remote viewers over WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::playback::{EventKind, PlaybackFact};
use crate::session::SessionEngine;

/// Track fields carried by the data-bearing events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPayload {
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub server: String,
}

/// One named event on the viewer wire. Pause and stop carry no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ViewerEvent {
    Play(TrackPayload),
    Resume(TrackPayload),
    Scrobble(TrackPayload),
    Pause,
    Stop,
}

impl ViewerEvent {
    /// Wire representation of a fact, or `None` for events that are not
    /// mirrored (unknown kinds).
    pub fn from_fact(fact: &PlaybackFact) -> Option<Self> {
        let track = || TrackPayload {
            title: fact.title.clone(),
            artists: fact.artists.clone(),
            album: fact.album.clone(),
            server: fact.server_label.clone(),
        };

        match fact.kind {
            EventKind::Play => Some(Self::Play(track())),
            EventKind::Resume => Some(Self::Resume(track())),
            EventKind::Scrobble => Some(Self::Scrobble(track())),
            EventKind::Pause => Some(Self::Pause),
            EventKind::Stop => Some(Self::Stop),
            EventKind::Unknown => None,
        }
    }

    /// Reconstruct the fact on the viewer side.
    pub fn into_fact(self) -> PlaybackFact {
        match self {
            Self::Play(track) => track.into_fact(EventKind::Play),
            Self::Resume(track) => track.into_fact(EventKind::Resume),
            Self::Scrobble(track) => track.into_fact(EventKind::Scrobble),
            Self::Pause => PlaybackFact::control(EventKind::Pause),
            Self::Stop => PlaybackFact::control(EventKind::Stop),
        }
    }
}

impl TrackPayload {
    fn into_fact(self, kind: EventKind) -> PlaybackFact {
        PlaybackFact {
            title: self.title,
            artists: self.artists,
            album: self.album,
            server_label: self.server,
            kind,
        }
    }
}

/// Accept viewer connections and forward every broadcast event to each
/// of them. Runs for the process lifetime.
pub async fn serve(
    bind: String,
    events: broadcast::Sender<ViewerEvent>,
    engine: Arc<SessionEngine>,
) {
    let listener = match TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind viewer fan-out listener on {}: {}", bind, e);
            return;
        }
    };

    tracing::info!("Viewer fan-out listening on {}", bind);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let receiver = events.subscribe();
                let replay = engine.current();
                tokio::spawn(handle_viewer(stream, peer, receiver, replay));
            }
            Err(e) => tracing::warn!("Failed to accept viewer connection: {}", e),
        }
    }
}

async fn handle_viewer(
    stream: TcpStream,
    peer: SocketAddr,
    mut receiver: broadcast::Receiver<ViewerEvent>,
    replay: Option<PlaybackFact>,
) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!("WebSocket handshake failed for {}: {}", peer, e);
            return;
        }
    };

    tracing::info!("Viewer connected: {}", peer);

    let (mut tx, mut rx) = socket.split();

    // A viewer joining mid-track gets the current status right away.
    if let Some(event) = replay.as_ref().and_then(ViewerEvent::from_fact) {
        if send_event(&mut tx, &event).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Ok(event) => {
                    if send_event(&mut tx, &event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Viewer {} lagging, skipped {} events", peer, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = rx.next() => match message {
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("Viewer {} socket error: {}", peer, e);
                    break;
                }
                None => break,
            },
        }
    }

    tracing::info!("Viewer disconnected: {}", peer);
}

async fn send_event(
    tx: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
    event: &ViewerEvent,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode viewer event: {}", e);
            return Ok(());
        }
    };
    tx.send(Message::text(text)).await
}
