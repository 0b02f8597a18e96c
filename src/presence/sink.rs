//! Translates engine decisions into presence-client calls.

use std::sync::Mutex;

use super::traits::{ActivityKind, PresenceClient, PresenceUpdate, Slot};
use crate::playback::PlaybackFact;

/// Stateless adapter in front of the presence client. Its only state is
/// the next slot to allocate; each publish lands on the alternate slot
/// from the previous one, and a clear is addressed to the slot of the
/// publish it undoes.
pub struct PresenceSink {
    client: Box<dyn PresenceClient>,
    next_slot: Mutex<Slot>,
}

impl PresenceSink {
    pub fn new(client: Box<dyn PresenceClient>) -> Self {
        Self {
            client,
            next_slot: Mutex::new(0),
        }
    }

    /// Publish a now-playing fact and return the slot it was published on.
    pub fn publish(&self, fact: &PlaybackFact, image: &str) -> Slot {
        let slot = {
            let mut next = self.next_slot.lock().unwrap();
            let slot = *next;
            *next = slot ^ 1;
            slot
        };

        let update = PresenceUpdate {
            slot,
            details: fact.title.clone(),
            state: fact.artists.join("; "),
            large_image: image.to_string(),
            large_text: format!("Listening on {}", fact.server_label),
            small_image: None,
            small_text: None,
            kind: ActivityKind::Listening,
        };

        tracing::debug!(
            client = self.client.name(),
            slot,
            title = %update.details,
            "publishing presence"
        );
        self.client.update(&update);
        slot
    }

    /// Clear the status published on `slot`.
    pub fn clear(&self, slot: Slot) {
        tracing::debug!(client = self.client.name(), slot, "clearing presence");
        self.client.clear(slot);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::playback::EventKind;

    #[derive(Debug, PartialEq)]
    enum Call {
        Update(Slot, String, String),
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
            self.calls.lock().unwrap().push(Call::Update(
                update.slot,
                update.details.clone(),
                update.state.clone(),
            ));
        }

        fn clear(&self, slot: Slot) {
            self.calls.lock().unwrap().push(Call::Clear(slot));
        }
    }

    fn fact(title: &str) -> PlaybackFact {
        PlaybackFact {
            title: title.to_string(),
            artists: vec!["Band A".to_string()],
            album: Some("Album A".to_string()),
            server_label: "Home".to_string(),
            kind: EventKind::Play,
        }
    }

    #[test]
    fn slots_alternate_between_publishes() {
        let recorder = Recorder::default();
        let calls = Arc::clone(&recorder.calls);
        let sink = PresenceSink::new(Box::new(recorder));

        let a = sink.publish(&fact("A"), "plex-icon");
        let b = sink.publish(&fact("B"), "plex-icon");
        let c = sink.publish(&fact("C"), "plex-icon");

        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn clear_addresses_the_given_slot() {
        let recorder = Recorder::default();
        let calls = Arc::clone(&recorder.calls);
        let sink = PresenceSink::new(Box::new(recorder));

        let slot = sink.publish(&fact("A"), "plex-icon");
        sink.clear(slot);

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], Call::Update(0, "A".to_string(), "Band A".to_string()));
        assert_eq!(calls[1], Call::Clear(0));
    }
}
