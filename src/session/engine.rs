//! The state machine owning "what is currently shown".

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::artwork::{ArtworkResolver, DEFAULT_ART};
use crate::playback::{EventKind, PlaybackFact};
use crate::presence::{PresenceSink, Slot};

/// The engine's single mutable record. One instance per process, mutated
/// only under the engine's mutex — including by the debounce timer task.
#[derive(Debug, Default)]
struct SessionState {
    /// The fact currently reflected in the presence status.
    current: Option<PlaybackFact>,
    /// Snapshot of the last fact that was live before a `Stop`.
    last_played: Option<PlaybackFact>,
    /// Slot holding the live status, if one is published.
    shown_slot: Option<Slot>,
    /// A debounced clear is outstanding.
    pending_clear: bool,
    /// Bumped on every state-changing event. Delayed tasks (the debounce
    /// timer, art lookup completions) capture the value at schedule time
    /// and act only if it is still current, so a superseded task is a
    /// safe no-op rather than something that must be cancelled.
    generation: u64,
}

/// Consumes `PlaybackFact`s and decides when to publish or clear the
/// externally visible presence status.
pub struct SessionEngine {
    sink: Arc<PresenceSink>,
    resolver: Option<Arc<ArtworkResolver>>,
    debounce: Duration,
    runtime: Handle,
    state: Mutex<SessionState>,
}

impl SessionEngine {
    pub fn new(
        sink: Arc<PresenceSink>,
        resolver: Option<Arc<ArtworkResolver>>,
        debounce: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            sink,
            resolver,
            debounce,
            runtime,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Feed one normalized event through the state machine.
    pub fn handle(self: &Arc<Self>, fact: PlaybackFact) {
        match fact.kind {
            EventKind::Play | EventKind::Resume | EventKind::Scrobble => self.publish(fact),
            EventKind::Pause => self.pause(),
            EventKind::Stop => self.stop(),
            EventKind::Unknown => {
                tracing::info!("ignoring unknown event");
            }
        }
    }

    /// The fact currently shown, if any.
    pub fn current(&self) -> Option<PlaybackFact> {
        self.state.lock().unwrap().current.clone()
    }

    /// Replacing one track with another never goes through `Idle`: the
    /// new fact becomes current immediately and supersedes any pending
    /// clear, keeping the status continuous across track changes.
    fn publish(self: &Arc<Self>, fact: PlaybackFact) {
        let generation = {
            let mut state = self.state.lock().unwrap();
            state.generation += 1;
            state.pending_clear = false;
            state.current = Some(fact.clone());
            state.generation
        };

        tracing::info!(title = %fact.title, server = %fact.server_label, "now playing");

        match &self.resolver {
            // The lookup runs off the event path so a slow or hanging
            // Last.fm call cannot stall later events or the timer.
            Some(resolver) => {
                let resolver = Arc::clone(resolver);
                let this = Arc::clone(self);
                self.runtime.spawn(async move {
                    let art = resolver.resolve(&fact.artists, fact.album.as_deref()).await;
                    this.finish_publish(generation, fact, &art.image_ref);
                });
            }
            None => self.finish_publish(generation, fact, DEFAULT_ART),
        }
    }

    /// Completion half of a publish. Drops the update if another event
    /// arrived while the art lookup was in flight.
    fn finish_publish(&self, generation: u64, fact: PlaybackFact, image: &str) {
        let mut state = self.state.lock().unwrap();
        if state.generation != generation {
            tracing::debug!(title = %fact.title, "publish superseded before completion");
            return;
        }
        let slot = self.sink.publish(&fact, image);
        state.shown_slot = Some(slot);
    }

    /// Pausing is a deliberate foreground action; clear synchronously
    /// with no debounce.
    fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.pending_clear = false;
        state.current = None;
        match state.shown_slot.take() {
            Some(slot) => self.sink.clear(slot),
            None => tracing::debug!("pause with nothing showing"),
        }
    }

    /// A `Stop` does not clear immediately: players emit `Stop` then
    /// `Play` for the next queued track, and clearing in that gap
    /// flickers the status. The clear is deferred by the debounce delay
    /// and re-validated at fire time.
    fn stop(self: &Arc<Self>) {
        let generation = {
            let mut state = self.state.lock().unwrap();
            state.generation += 1;
            if let Some(current) = state.current.take() {
                state.last_played = Some(current);
            }
            state.pending_clear = true;
            state.generation
        };

        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(this.debounce).await;
            this.finish_clear(generation);
        });
    }

    /// Fire half of the debounce timer: clear only if nothing new became
    /// current in the meantime. A superseded timer is a no-op, never a
    /// hard cancel.
    fn finish_clear(&self, generation: u64) {
        let mut state = self.state.lock().unwrap();
        if state.generation != generation || state.current.is_some() {
            tracing::debug!("debounced clear superseded");
            return;
        }
        state.pending_clear = false;
        if let Some(title) = state.last_played.as_ref().map(|f| f.title.clone()) {
            tracing::info!(%title, "stopped, clearing presence");
        }
        if let Some(slot) = state.shown_slot.take() {
            self.sink.clear(slot);
        }
    }

    /// Best-effort clear of any live status, for process shutdown.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.pending_clear = false;
        state.current = None;
        if let Some(slot) = state.shown_slot.take() {
            self.sink.clear(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::runtime::Handle;

    use super::*;
    use crate::presence::{PresenceClient, PresenceUpdate};

    const DEBOUNCE: Duration = Duration::from_secs(5);

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Update { slot: Slot, details: String, state: String },
        Clear(Slot),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl PresenceClient for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn update(&self, update: &PresenceUpdate) {
            self.calls.lock().unwrap().push(Call::Update {
                slot: update.slot,
                details: update.details.clone(),
                state: update.state.clone(),
            });
        }

        fn clear(&self, slot: Slot) {
            self.calls.lock().unwrap().push(Call::Clear(slot));
        }
    }

    fn engine() -> (Arc<SessionEngine>, Arc<Mutex<Vec<Call>>>) {
        let recorder = Recorder::default();
        let calls = Arc::clone(&recorder.calls);
        let sink = Arc::new(PresenceSink::new(Box::new(recorder)));
        let engine = Arc::new(SessionEngine::new(sink, None, DEBOUNCE, Handle::current()));
        (engine, calls)
    }

    fn playing(title: &str) -> PlaybackFact {
        PlaybackFact {
            title: title.to_string(),
            artists: vec!["Band A".to_string()],
            album: Some("Album A".to_string()),
            server_label: "Home".to_string(),
            kind: EventKind::Play,
        }
    }

    fn control(kind: EventKind) -> PlaybackFact {
        PlaybackFact::control(kind)
    }

    #[tokio::test]
    async fn play_publishes_title_and_artist() {
        let (engine, calls) = engine();

        engine.handle(playing("Song A"));

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![Call::Update {
                slot: 0,
                details: "Song A".to_string(),
                state: "Band A".to_string(),
            }]
        );
        assert_eq!(engine.current().unwrap().title, "Song A");
    }

    #[tokio::test]
    async fn repeated_pause_from_idle_is_a_no_op() {
        let (engine, calls) = engine();

        engine.handle(control(EventKind::Pause));
        engine.handle(control(EventKind::Pause));
        engine.handle(control(EventKind::Pause));

        assert!(calls.lock().unwrap().is_empty());
        assert!(engine.current().is_none());
    }

    #[tokio::test]
    async fn replacing_a_track_republishes_on_the_alternate_slot() {
        let (engine, calls) = engine();

        engine.handle(playing("Song A"));
        engine.handle(playing("Song B"));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::Update { slot: 0, .. }));
        assert!(matches!(calls[1], Call::Update { slot: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_absorbs_a_stop_play_gap() {
        let (engine, calls) = engine();

        engine.handle(playing("Song A"));
        engine.handle(control(EventKind::Stop));
        tokio::time::sleep(Duration::from_secs(2)).await;
        engine.handle(playing("Song B"));
        tokio::time::sleep(DEBOUNCE * 3).await;

        let calls = calls.lock().unwrap();
        let clears = calls.iter().filter(|c| matches!(c, Call::Clear(_))).count();
        let updates = calls.iter().filter(|c| matches!(c, Call::Update { .. })).count();
        assert_eq!(clears, 0);
        assert_eq!(updates, 2);
        assert_eq!(engine.current().unwrap().title, "Song B");
    }

    #[tokio::test(start_paused = true)]
    async fn bare_stop_clears_once_after_the_delay() {
        let (engine, calls) = engine();

        engine.handle(playing("Song A"));
        engine.handle(control(EventKind::Stop));

        // Nothing happens before the window elapses.
        tokio::time::sleep(DEBOUNCE - Duration::from_millis(1)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], Call::Clear(0));
        assert!(engine.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_stop_still_clears_exactly_once() {
        let (engine, calls) = engine();

        engine.handle(playing("Song A"));
        engine.handle(control(EventKind::Stop));
        tokio::time::sleep(Duration::from_secs(1)).await;
        engine.handle(control(EventKind::Stop));
        tokio::time::sleep(DEBOUNCE * 3).await;

        let calls = calls.lock().unwrap();
        let clears = calls.iter().filter(|c| matches!(c, Call::Clear(_))).count();
        assert_eq!(clears, 1);
    }

    #[tokio::test]
    async fn pause_clears_immediately_on_the_published_slot() {
        let (engine, calls) = engine();

        engine.handle(playing("Song A"));
        engine.handle(control(EventKind::Pause));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], Call::Clear(0));
    }

    #[tokio::test]
    async fn unknown_event_changes_nothing() {
        let (engine, calls) = engine();

        engine.handle(playing("Song A"));
        let before = engine.current();
        engine.handle(control(EventKind::Unknown));

        assert_eq!(engine.current(), before);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_clears_the_live_status() {
        let (engine, calls) = engine();

        engine.handle(playing("Song A"));
        engine.shutdown();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[1], Call::Clear(0));
    }
}
