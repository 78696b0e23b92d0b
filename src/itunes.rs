use std::io::Write;
use std::path::Path;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::{Context, eyre};
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;

use crate::ports::{PreviewSource, TrackCandidate};

const SEARCH_URL: &str = "https://itunes.apple.com/search";
const RESULT_LIMIT: u32 = 5;

/// Upper bound on any single network call, so an unresponsive provider
/// cannot stall the whole run.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub result_count: u32,
    pub results: Vec<ItunesTrack>,
}

/// One track record from the iTunes Search API. Only the fields the
/// pipeline folds into the catalog are deserialized.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItunesTrack {
    #[serde(default)]
    pub track_name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub artwork_url100: Option<String>,
    #[serde(default)]
    pub track_view_url: Option<String>,
}

/// The API only hands out 100x100 artwork; the CDN serves other square
/// sizes through plain URL substitution.
fn upscale_artwork(url: &str) -> String {
    url.replace("100x100", "300x300")
}

impl From<ItunesTrack> for TrackCandidate {
    fn from(track: ItunesTrack) -> Self {
        TrackCandidate {
            name: track.track_name,
            artist: track.artist_name,
            album: track.collection_name.unwrap_or_default(),
            preview_url: track.preview_url,
            artwork_url: track.artwork_url100.as_deref().map(upscale_artwork),
            external_url: track.track_view_url,
        }
    }
}

/// iTunes Search API client. Public and unauthenticated, so no key is
/// needed, but callers are expected to self-throttle between requests.
pub struct ItunesClient {
    client: Client,
}

impl ItunesClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PreviewSource for ItunesClient {
    async fn search(&self, title: &str, artist: &str) -> Result<Vec<TrackCandidate>> {
        let term = format!("{artist} {title}");
        let url = format!(
            "{SEARCH_URL}?term={}&entity=song&limit={RESULT_LIMIT}",
            urlencoding::encode(&term)
        );

        log::debug!("Making iTunes search request\n\tURL:{url}");

        let resp: SearchResponse = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to send iTunes search request to {url}"))?
            .error_for_status()
            .wrap_err("iTunes search returned an error status")?
            .json()
            .await
            .wrap_err_with(|| format!("Failed to parse iTunes search response from {url}"))?;

        log::debug!("iTunes search returned {} results", resp.result_count);

        Ok(resp.results.into_iter().map(TrackCandidate::from).collect())
    }

    async fn fetch_preview(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to request preview audio from {url}"))?
            .error_for_status()
            .wrap_err("Preview download returned an error status")?;

        let dir = dest
            .parent()
            .ok_or_else(|| eyre!("Destination path has no parent directory"))?;

        // Stage in a temp file and rename into place, so a stream failure
        // never leaves a partial file that a later run would treat as a
        // valid cached preview.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .wrap_err("Failed to create temporary download file")?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.wrap_err("Preview download stream failed")?;
            tmp.write_all(&chunk)
                .wrap_err("Failed to write preview chunk")?;
        }
        tmp.flush().wrap_err("Failed to flush preview file")?;

        tmp.persist(dest)
            .wrap_err_with(|| format!("Failed to persist preview to {}", dest.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_search_response() {
        let json = r#"{
            "resultCount": 1,
            "results": [{
                "trackName": "BLUE",
                "artistName": "Billie Eilish",
                "collectionName": "HIT ME HARD AND SOFT",
                "previewUrl": "https://audio.example.com/a.m4a",
                "artworkUrl100": "https://img.example.com/100x100bb.jpg",
                "trackViewUrl": "https://music.apple.com/us/song/1"
            }]
        }"#;

        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.result_count, 1);
        assert_eq!(resp.results[0].track_name, "BLUE");
        assert_eq!(
            resp.results[0].preview_url.as_deref(),
            Some("https://audio.example.com/a.m4a")
        );
    }

    #[test]
    fn test_deserialize_tolerates_missing_optional_fields() {
        let json = r#"{
            "resultCount": 1,
            "results": [{"trackName": "Song", "artistName": "Artist"}]
        }"#;

        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        let track = &resp.results[0];
        assert!(track.preview_url.is_none());
        assert!(track.artwork_url100.is_none());
        assert!(track.track_view_url.is_none());
    }

    #[test]
    fn test_candidate_artwork_is_upscaled() {
        let track = ItunesTrack {
            track_name: "Song".to_string(),
            artist_name: "Artist".to_string(),
            collection_name: Some("Album".to_string()),
            preview_url: Some("https://audio.example.com/a.m4a".to_string()),
            artwork_url100: Some("https://img.example.com/100x100bb.jpg".to_string()),
            track_view_url: None,
        };

        let candidate = TrackCandidate::from(track);
        assert_eq!(
            candidate.artwork_url.as_deref(),
            Some("https://img.example.com/300x300bb.jpg")
        );
        assert_eq!(candidate.album, "Album");
    }

    #[test]
    fn test_candidate_without_artwork_stays_empty() {
        let track = ItunesTrack {
            track_name: "Song".to_string(),
            artist_name: "Artist".to_string(),
            collection_name: None,
            preview_url: None,
            artwork_url100: None,
            track_view_url: None,
        };

        let candidate = TrackCandidate::from(track);
        assert!(candidate.artwork_url.is_none());
        assert_eq!(candidate.album, "");
    }
}
