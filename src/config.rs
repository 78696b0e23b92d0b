use std::path::PathBuf;

use color_eyre::Result;
use color_eyre::eyre::{Context, OptionExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to the song catalog JSON file.
    #[serde(default)]
    catalog: Option<String>,
    /// Directory downloaded audio previews land in.
    #[serde(default)]
    audio_directory: Option<String>,
    #[serde(default)]
    photos: Option<PhotoDirectories>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoDirectories {
    /// Uncompressed source photos.
    pub source_directory: String,
    /// Compressed WebP output, also the thumbnail input.
    pub processed_directory: String,
    pub thumbnail_directory: String,
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Get the config file path (similar to beets)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("portfolio-assets").join("config.toml"))
    }

    /// Load the config from the default location, falling back to an empty
    /// config when no file exists (every path can come from the CLI).
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Create a default config file, if it doesn't exist. Returns the path.
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path().ok_or_eyre("No config directory available")?;
        if path.exists() {
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let template = Config {
            catalog: Some("~/portfolio/public/data/current-top-songs.json".to_string()),
            audio_directory: Some("~/portfolio/public/audio".to_string()),
            photos: Some(PhotoDirectories {
                source_directory: "~/portfolio/public/Uncompressed-Photos".to_string(),
                processed_directory: "~/portfolio/public/Portfolio-Photos-WebP".to_string(),
                thumbnail_directory: "~/portfolio/public/Portfolio-Photos-Thumbnails".to_string(),
            }),
        };
        let contents =
            toml::to_string_pretty(&template).wrap_err("Failed to serialize default config")?;
        std::fs::write(&path, contents)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(path)
    }

    /// Expand ~ to home directory
    fn expand_path(path: &str) -> PathBuf {
        if path.starts_with("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(&path[2..]);
            }
        }
        PathBuf::from(path)
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog.as_deref().map(Self::expand_path)
    }

    pub fn audio_directory_path(&self) -> Option<PathBuf> {
        self.audio_directory.as_deref().map(Self::expand_path)
    }

    pub fn photo_source_path(&self) -> Option<PathBuf> {
        self.photos
            .as_ref()
            .map(|p| Self::expand_path(&p.source_directory))
    }

    pub fn photo_processed_path(&self) -> Option<PathBuf> {
        self.photos
            .as_ref()
            .map(|p| Self::expand_path(&p.processed_directory))
    }

    pub fn photo_thumbnail_path(&self) -> Option<PathBuf> {
        self.photos
            .as_ref()
            .map(|p| Self::expand_path(&p.thumbnail_directory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            catalog = "/srv/site/data/current-top-songs.json"
            audio_directory = "/srv/site/audio"

            [photos]
            source_directory = "/srv/site/raw"
            processed_directory = "/srv/site/webp"
            thumbnail_directory = "/srv/site/thumbs"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.catalog_path(),
            Some(PathBuf::from("/srv/site/data/current-top-songs.json"))
        );
        assert_eq!(
            config.photo_thumbnail_path(),
            Some(PathBuf::from("/srv/site/thumbs"))
        );
    }

    #[test]
    fn test_empty_config_has_no_paths() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.catalog_path().is_none());
        assert!(config.audio_directory_path().is_none());
        assert!(config.photo_source_path().is_none());
    }

    #[test]
    fn test_expand_path_leaves_absolute_paths_alone() {
        assert_eq!(
            Config::expand_path("/var/data/songs.json"),
            PathBuf::from("/var/data/songs.json")
        );
    }
}
