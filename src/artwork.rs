//! Best-effort album art lookup against Last.fm.

use std::future::Future;

use serde::Deserialize;

use crate::error::RelayError;

/// Asset key shown when no art could be resolved.
pub const DEFAULT_ART: &str = "plex-icon";

const ALBUM_INFO_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Last.fm error code for an artist the service cannot identify. The one
/// condition worth a retry: track-level artist strings ("A; B") often
/// fail where the unsplit directory entry succeeds.
const ERROR_ARTIST_NOT_FOUND: u32 = 6;

/// Index of the preferred resolution in Last.fm's image size ladder.
const PREFERRED_IMAGE_INDEX: usize = 3;

/// Outcome of a single art lookup. Ephemeral; produced per publish
/// decision, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    pub image_ref: String,
    pub attempted_alternate_artist: bool,
}

impl LookupResult {
    fn fallback(attempted_alternate_artist: bool) -> Self {
        Self {
            image_ref: DEFAULT_ART.to_string(),
            attempted_alternate_artist,
        }
    }
}

enum LookupFailure {
    /// Last.fm error 6. Worth exactly one retry with the unsplit artist.
    AmbiguousArtist,
    /// Anything else. Degrades straight to the default icon.
    Unavailable(RelayError),
}

/// Resolves cover art for artist/album pairs. Never fails outward; every
/// error path degrades to `DEFAULT_ART`.
pub struct ArtworkResolver {
    http: reqwest::Client,
    api_key: String,
}

impl ArtworkResolver {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
        }
    }

    pub async fn resolve(&self, artists: &[String], album: Option<&str>) -> LookupResult {
        let Some(album) = album else {
            return LookupResult::fallback(false);
        };
        let Some(primary) = artists.first() else {
            return LookupResult::fallback(false);
        };
        let full = artists.join("; ");

        resolve_with(primary, &full, album, |artist, album| {
            self.fetch_art(artist, album)
        })
        .await
    }

    async fn fetch_art(&self, artist: String, album: String) -> Result<String, LookupFailure> {
        let url = self.album_info_url(&artist, &album);

        let response = self.http.get(&url).send().await.map_err(|e| {
            LookupFailure::Unavailable(RelayError::EnrichmentUnavailable(e.to_string()))
        })?;
        let body: AlbumInfoResponse = response.json().await.map_err(|e| {
            LookupFailure::Unavailable(RelayError::EnrichmentUnavailable(e.to_string()))
        })?;

        art_from_response(body)
    }

    fn album_info_url(&self, artist: &str, album: &str) -> String {
        format!(
            "{ALBUM_INFO_URL}?method=album.getInfo&api_key={}&artist={}&album={}&format=json",
            self.api_key,
            encode_token(artist),
            encode_token(album)
        )
    }
}

/// The lookup algorithm, independent of the HTTP transport: one attempt
/// with the primary artist, one retry with the full unsplit artist string
/// on ambiguity, sentinel on everything else. A second ambiguous result
/// is accepted as a miss, never retried again.
async fn resolve_with<F, Fut>(primary: &str, full: &str, album: &str, mut fetch: F) -> LookupResult
where
    F: FnMut(String, String) -> Fut,
    Fut: Future<Output = Result<String, LookupFailure>>,
{
    match fetch(primary.to_string(), album.to_string()).await {
        Ok(image_ref) => LookupResult {
            image_ref,
            attempted_alternate_artist: false,
        },
        Err(LookupFailure::AmbiguousArtist) => {
            tracing::debug!(artist = primary, "ambiguous artist, retrying with unsplit artist string");
            match fetch(full.to_string(), album.to_string()).await {
                Ok(image_ref) => LookupResult {
                    image_ref,
                    attempted_alternate_artist: true,
                },
                Err(LookupFailure::AmbiguousArtist) => {
                    tracing::debug!(artist = full, "artist still ambiguous, using default icon");
                    LookupResult::fallback(true)
                }
                Err(LookupFailure::Unavailable(error)) => {
                    tracing::warn!(%error, "art lookup retry failed, using default icon");
                    LookupResult::fallback(true)
                }
            }
        }
        Err(LookupFailure::Unavailable(error)) => {
            tracing::warn!(%error, "art lookup failed, using default icon");
            LookupResult::fallback(false)
        }
    }
}

fn art_from_response(body: AlbumInfoResponse) -> Result<String, LookupFailure> {
    if let Some(code) = body.error {
        if code == ERROR_ARTIST_NOT_FOUND {
            return Err(LookupFailure::AmbiguousArtist);
        }
        return Err(LookupFailure::Unavailable(RelayError::EnrichmentUnavailable(
            format!("service error {code}"),
        )));
    }

    let url = body
        .album
        .map(|a| a.image)
        .unwrap_or_default()
        .into_iter()
        .nth(PREFERRED_IMAGE_INDEX)
        .map(|i| i.url)
        .unwrap_or_default();

    // Last.fm reports albums it knows but has no art for as "" entries.
    if url.is_empty() {
        return Err(LookupFailure::Unavailable(RelayError::EnrichmentUnavailable(
            "album has no art".to_string(),
        )));
    }

    Ok(url)
}

/// URL-safe-encode a lookup token: spaces become `+`, everything
/// non-alphanumeric (apostrophe variants included, normalized to `'`
/// first) is percent-encoded.
fn encode_token(token: &str) -> String {
    let normalized = token.replace(['\u{2018}', '\u{2019}'], "'");
    url::form_urlencoded::byte_serialize(normalized.as_bytes()).collect()
}

#[derive(Debug, Deserialize)]
struct AlbumInfoResponse {
    album: Option<AlbumInfo>,
    error: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AlbumInfo {
    #[serde(default)]
    image: Vec<AlbumImage>,
}

#[derive(Debug, Deserialize)]
struct AlbumImage {
    #[serde(rename = "#text")]
    url: String,
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn tokens_are_url_safe_encoded() {
        assert_eq!(encode_token("Band Name"), "Band+Name");
        assert_eq!(encode_token("Don't Stop"), "Don%27t+Stop");
        assert_eq!(encode_token("Don\u{2019}t Stop"), "Don%27t+Stop");
        assert_eq!(encode_token("AC/DC"), "AC%2FDC");
    }

    #[test]
    fn preferred_resolution_is_extracted() {
        let body: AlbumInfoResponse = serde_json::from_str(
            r##"{"album": {"image": [
                {"#text": "s", "size": "small"},
                {"#text": "m", "size": "medium"},
                {"#text": "l", "size": "large"},
                {"#text": "xl", "size": "extralarge"}
            ]}}"##,
        )
        .unwrap();

        assert_eq!(art_from_response(body).ok().as_deref(), Some("xl"));
    }

    #[test]
    fn error_six_maps_to_ambiguous_artist() {
        let body: AlbumInfoResponse =
            serde_json::from_str(r#"{"error": 6, "message": "Artist not found"}"#).unwrap();
        assert!(matches!(
            art_from_response(body),
            Err(LookupFailure::AmbiguousArtist)
        ));
    }

    #[tokio::test]
    async fn ambiguity_triggers_exactly_one_retry_with_unsplit_artist() {
        let attempts = Cell::new(0u32);
        let result = resolve_with("First", "First; Second", "Album", |artist, _album| {
            attempts.set(attempts.get() + 1);
            let outcome = if artist == "First" {
                Err(LookupFailure::AmbiguousArtist)
            } else {
                assert_eq!(artist, "First; Second");
                Ok("https://art.example/cover.png".to_string())
            };
            async move { outcome }
        })
        .await;

        assert_eq!(attempts.get(), 2);
        assert_eq!(result.image_ref, "https://art.example/cover.png");
        assert!(result.attempted_alternate_artist);
    }

    #[tokio::test]
    async fn second_ambiguity_yields_the_sentinel_without_a_third_attempt() {
        let attempts = Cell::new(0u32);
        let result = resolve_with("First", "First; Second", "Album", |_artist, _album| {
            attempts.set(attempts.get() + 1);
            async { Err(LookupFailure::AmbiguousArtist) }
        })
        .await;

        assert_eq!(attempts.get(), 2);
        assert_eq!(result.image_ref, DEFAULT_ART);
        assert!(result.attempted_alternate_artist);
    }

    #[tokio::test]
    async fn other_failures_degrade_without_retrying() {
        let attempts = Cell::new(0u32);
        let result = resolve_with("First", "First", "Album", |_artist, _album| {
            attempts.set(attempts.get() + 1);
            async {
                Err(LookupFailure::Unavailable(RelayError::EnrichmentUnavailable(
                    "connection refused".to_string(),
                )))
            }
        })
        .await;

        assert_eq!(attempts.get(), 1);
        assert_eq!(result.image_ref, DEFAULT_ART);
        assert!(!result.attempted_alternate_artist);
    }
}
