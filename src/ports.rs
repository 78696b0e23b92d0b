use std::path::Path;

use color_eyre::eyre::Result;

/// Decoupled representation of a track candidate from the search API.
///
/// Transient: produced per search call and folded into the catalog entry,
/// never persisted itself.
#[derive(Debug, Clone)]
pub struct TrackCandidate {
    pub name: String,
    pub artist: String,
    pub album: String,
    pub preview_url: Option<String>,
    pub artwork_url: Option<String>,
    pub external_url: Option<String>,
}

/// Port trait wrapping the preview provider capabilities used by the sync loop.
///
/// Implementations live in `itunes` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PreviewSource: Send + Sync {
    /// Search the provider for `"<artist> <title>"`, returning candidates in
    /// the provider's own relevance order.
    async fn search(&self, title: &str, artist: &str) -> Result<Vec<TrackCandidate>>;

    /// Stream the audio resource at `url` to `dest`. A failed transfer must
    /// not leave a partial file at `dest`.
    async fn fetch_preview(&self, url: &str, dest: &Path) -> Result<()>;
}
