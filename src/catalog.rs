use std::io::Write;
use std::path::Path;

use color_eyre::Result;
use color_eyre::eyre::Context;
use serde::{Deserialize, Serialize};

/// A single entry in the song catalog.
///
/// `title` and `artist` come from the top-songs producer and are the search
/// keys; the remaining known fields are set by the sync pipeline. Fields the
/// pipeline does not know about are carried through `extra` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub apple_url: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The persisted song catalog: loaded once at pipeline start, mutated in
/// memory, written back once at the end of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub songs: Vec<Song>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read catalog file: {}", path.display()))?;
        let catalog = serde_json::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse catalog file: {}", path.display()))?;
        Ok(catalog)
    }

    /// Overwrite the catalog file. Contents are staged in a temporary file
    /// and renamed into place, so a failed write cannot truncate the
    /// existing catalog.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(self).wrap_err("Failed to serialize catalog")?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .wrap_err("Failed to create temporary catalog file")?;
        tmp.write_all(contents.as_bytes())
            .wrap_err("Failed to write catalog contents")?;
        tmp.persist(path)
            .wrap_err_with(|| format!("Failed to persist catalog file: {}", path.display()))?;

        Ok(())
    }
}
