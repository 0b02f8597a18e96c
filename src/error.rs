use thiserror::Error;

/// Failure taxonomy for the relay.
///
/// None of these are fatal to the process: a malformed payload aborts only
/// its own request, enrichment failures degrade to the default art, and a
/// dead presence client drops the update while the engine state still
/// advances.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("enrichment unavailable: {0}")]
    EnrichmentUnavailable(String),

    #[error("presence client unavailable")]
    PresenceClientUnavailable,
}
