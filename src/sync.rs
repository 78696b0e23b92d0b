use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::Context;
use regex::Regex;

use crate::catalog::{Catalog, Song};
use crate::ports::{PreviewSource, TrackCandidate};

/// Web-facing prefix under which downloaded previews are served by the site.
const PREVIEW_URL_PREFIX: &str = "/audio";

/// Apple Music previews are m4a clips.
const PREVIEW_EXTENSION: &str = "m4a";

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Fixed pause between entries. The search API is public and
    /// unauthenticated, so the pipeline self-throttles instead of fanning
    /// out. Tests set this to zero.
    pub request_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(500),
        }
    }
}

/// Per-entry failure classification. These are logged and counted; they
/// never abort the run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncEntryError {
    #[error("Search failed: {reason}")]
    Search { reason: String },

    #[error("Preview download failed: {reason}")]
    Download { reason: String },
}

/// Aggregate counters for one full pass over the catalog.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub downloaded: usize,
    pub cached: usize,
    pub no_match: usize,
    pub no_preview: usize,
    pub errored: usize,
}

impl RunSummary {
    /// Entries whose catalog record now points at a local preview file.
    pub fn resolved(&self) -> usize {
        self.downloaded + self.cached
    }

    pub fn skipped(&self) -> usize {
        self.no_match + self.no_preview
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} resolved ({} downloaded, {} cached), {} skipped, {} errored, {} total",
            self.resolved(),
            self.downloaded,
            self.cached,
            self.skipped(),
            self.errored,
            self.total
        )
    }
}

/// Fields folded into a song record after a successful resolution.
#[derive(Debug)]
struct ResolvedPreview {
    preview_url: String,
    apple_url: Option<String>,
    artwork_url: Option<String>,
    freshly_downloaded: bool,
}

#[derive(Debug)]
enum EntryOutcome {
    NotFound,
    NoPreview,
    Resolved(ResolvedPreview),
}

fn contains_either_way(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a.contains(&b) || b.contains(&a)
}

/// Pick the first candidate, in provider order, whose title and artist both
/// pass the bidirectional case-insensitive substring test and which exposes
/// a preview URL.
///
/// Provider relevance ordering is trusted over local scoring. This rejects
/// near-miss variants (a "feat." suffix on one side only, say) when neither
/// string contains the other; that false negative is accepted behavior.
pub fn find_match<'a>(
    candidates: &'a [TrackCandidate],
    title: &str,
    artist: &str,
) -> Option<&'a TrackCandidate> {
    candidates.iter().find(|candidate| {
        contains_either_way(&candidate.name, title)
            && contains_either_way(&candidate.artist, artist)
            && candidate
                .preview_url
                .as_deref()
                .is_some_and(|url| !url.is_empty())
    })
}

static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();
static WHITESPACE: OnceLock<Regex> = OnceLock::new();

/// Derive the deterministic on-disk filename for a preview clip: strip
/// everything outside `[A-Za-z0-9\s-]`, turn whitespace runs into single
/// hyphens, lowercase. Re-runs map a song to the same file, which is what
/// the existence-based cache check keys on.
pub fn preview_filename(artist: &str, title: &str) -> String {
    let unsafe_chars = UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^A-Za-z0-9\s-]").unwrap());
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").unwrap());

    let raw = format!("{artist} - {title}");
    let stripped = unsafe_chars.replace_all(&raw, "");
    let hyphenated = whitespace.replace_all(&stripped, "-");

    format!("{}.{PREVIEW_EXTENSION}", hyphenated.to_lowercase())
}

/// Resolve one catalog entry: search, match, idempotence-check, download.
/// Pure with respect to the catalog; the caller applies the outcome.
async fn process_song(
    source: &dyn PreviewSource,
    song: &Song,
    audio_dir: &Path,
) -> Result<EntryOutcome, SyncEntryError> {
    log::debug!("Searching for \"{}\" by {}", song.title, song.artist);

    let candidates = source
        .search(&song.title, &song.artist)
        .await
        .map_err(|e| SyncEntryError::Search {
            reason: e.to_string(),
        })?;

    let candidate = match find_match(&candidates, &song.title, &song.artist) {
        Some(candidate) => candidate,
        None => {
            log::info!("Not found: \"{}\" by {}", song.title, song.artist);
            return Ok(EntryOutcome::NotFound);
        }
    };

    let preview_url = match candidate.preview_url.as_deref() {
        Some(url) if !url.is_empty() => url,
        _ => {
            log::info!("No preview available for \"{}\"", candidate.name);
            return Ok(EntryOutcome::NoPreview);
        }
    };

    log::info!(
        "Found \"{}\" by {} ({})",
        candidate.name,
        candidate.artist,
        candidate.album
    );

    let filename = preview_filename(&song.artist, &song.title);
    let dest = audio_dir.join(&filename);

    // File existence is the sole cache key; contents are never re-validated.
    let freshly_downloaded = if dest.exists() {
        log::info!("Already downloaded, using existing file: {filename}");
        false
    } else {
        log::info!("Downloading preview to {filename}");
        source
            .fetch_preview(preview_url, &dest)
            .await
            .map_err(|e| SyncEntryError::Download {
                reason: e.to_string(),
            })?;
        true
    };

    Ok(EntryOutcome::Resolved(ResolvedPreview {
        preview_url: format!("{PREVIEW_URL_PREFIX}/{filename}"),
        apple_url: candidate.external_url.clone(),
        artwork_url: candidate.artwork_url.clone(),
        freshly_downloaded,
    }))
}

fn apply_resolution(song: &mut Song, resolved: &ResolvedPreview) {
    song.preview_url = Some(resolved.preview_url.clone());
    song.apple_url = resolved.apple_url.clone();
    // Artwork is only overwritten when the match actually carries one.
    if resolved.artwork_url.is_some() {
        song.artwork_url = resolved.artwork_url.clone();
    }
}

/// Run one full synchronization pass over the catalog at `catalog_path`.
///
/// Entries are processed strictly one at a time, in catalog order. A
/// per-entry failure is logged, counted, and skipped; only catalog load and
/// the final catalog write are fatal. The catalog file is written exactly
/// once, after the full iteration, so an aborted run leaves it untouched.
pub async fn run_sync(
    source: &dyn PreviewSource,
    catalog_path: &Path,
    audio_dir: &Path,
    options: &SyncOptions,
) -> Result<RunSummary> {
    let mut catalog = Catalog::load(catalog_path)?;

    tokio::fs::create_dir_all(audio_dir)
        .await
        .wrap_err_with(|| format!("Failed to create audio directory: {}", audio_dir.display()))?;

    let total = catalog.songs.len();
    log::info!("Processing {total} songs from {}", catalog_path.display());

    let mut summary = RunSummary {
        total,
        ..RunSummary::default()
    };

    for (index, song) in catalog.songs.iter_mut().enumerate() {
        log::info!(
            "[{}/{}] \"{}\" by {}",
            index + 1,
            total,
            song.title,
            song.artist
        );

        match process_song(source, song, audio_dir).await {
            Ok(EntryOutcome::NotFound) => summary.no_match += 1,
            Ok(EntryOutcome::NoPreview) => summary.no_preview += 1,
            Ok(EntryOutcome::Resolved(resolved)) => {
                if resolved.freshly_downloaded {
                    summary.downloaded += 1;
                } else {
                    summary.cached += 1;
                }
                apply_resolution(song, &resolved);
            }
            Err(err) => {
                log::warn!("[{}/{}] {err}", index + 1, total);
                summary.errored += 1;
            }
        }

        if index + 1 < total && !options.request_delay.is_zero() {
            tokio::time::sleep(options.request_delay).await;
        }
    }

    log::info!("Updating catalog at {}", catalog_path.display());
    catalog.save(catalog_path)?;

    Ok(summary)
}
