use anyhow::{Context, Result};
use confyg::{env, Confygery};
use ledgerline_core::schema::CATALOG_FILE_NAME;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Configuration for ledgerline.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (LEDGER_* prefix)
/// 3. Config file (~/.config/ledgerline/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory scanned for audio files.
    ///
    /// Can be set via:
    /// - CLI: --songs-dir /path
    /// - ENV: LEDGER_SONGS_DIR
    /// - Config: songs_dir = "/path"
    pub songs_dir: Option<PathBuf>,

    /// Directory receiving deduplicated cover images.
    ///
    /// Can be set via:
    /// - CLI: --images-dir /path
    /// - ENV: LEDGER_IMAGES_DIR
    /// - Config: images_dir = "/path"
    pub images_dir: Option<PathBuf>,

    /// Directory holding the catalog database (`songs.db`).
    ///
    /// Default: ~/.local/share/ledgerline
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub logging: twyg::Opts,
}

/// Tuning for the ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Worker threads; the host's available parallelism when unset.
    pub workers: Option<usize>,

    /// Extension of the audio files to catalog.
    pub extension: String,

    /// Images whose fingerprints differ by fewer bits are duplicates.
    pub similarity_threshold: u32,

    /// Edge length, in pixels, of saved covers.
    pub cover_size: u32,

    /// JPEG quality of saved covers (1-100).
    pub jpeg_quality: u8,

    /// Songs written per catalog transaction.
    pub batch_size: usize,

    /// Register covers already in the images directory before the run.
    pub seed_from_existing_images: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: None,
            extension: String::from("mp3"),
            similarity_threshold: 10,
            cover_size: 500,
            jpeg_quality: 95,
            batch_size: 64,
            seed_from_existing_images: true,
        }
    }
}

impl IngestConfig {
    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.cover_size == 0 {
            return Err(ConfigError::Invalid {
                key: "ingest.cover_size",
                reason: "must be at least 1 pixel".to_string(),
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid {
                key: "ingest.jpeg_quality",
                reason: format!("{} is outside 1-100", self.jpeg_quality),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "ingest.batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid {
                key: "ingest.extension",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// The three directories a run works with, all resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPaths {
    pub songs_dir: PathBuf,
    pub images_dir: PathBuf,
    pub root_dir: PathBuf,
}

impl LibraryPaths {
    /// Location of the catalog database.
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.root_dir.join(CATALOG_FILE_NAME)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            songs_dir: None,
            images_dir: None,
            root_dir: default_root_dir(),
            ingest: IngestConfig::default(),
            logging: twyg::Opts::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/ledgerline/config.toml
    /// Reads environment variables with LEDGER_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("ledger");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;

        Ok(config)
    }

    /// Apply CLI overrides on top of the loaded values.
    #[must_use]
    pub fn with_overrides(
        mut self,
        songs_dir: Option<PathBuf>,
        images_dir: Option<PathBuf>,
        root_dir: Option<PathBuf>,
        workers: Option<usize>,
    ) -> Self {
        if songs_dir.is_some() {
            self.songs_dir = songs_dir;
        }
        if images_dir.is_some() {
            self.images_dir = images_dir;
        }
        if let Some(root_dir) = root_dir {
            self.root_dir = root_dir;
        }
        if workers.is_some() {
            self.ingest.workers = workers;
        }
        self
    }

    /// Resolve the library directories.
    ///
    /// # Errors
    ///
    /// Fails when `songs_dir` or `images_dir` is missing or empty.
    pub fn paths(&self) -> std::result::Result<LibraryPaths, ConfigError> {
        let songs_dir = required(self.songs_dir.as_ref(), "songs_dir", "LEDGER_SONGS_DIR")?;
        let images_dir = required(self.images_dir.as_ref(), "images_dir", "LEDGER_IMAGES_DIR")?;

        Ok(LibraryPaths {
            songs_dir,
            images_dir,
            root_dir: self.root_dir.clone(),
        })
    }
}

fn required(
    value: Option<&PathBuf>,
    key: &'static str,
    env: &'static str,
) -> std::result::Result<PathBuf, ConfigError> {
    value
        .filter(|path| !path.as_os_str().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::Missing {
            key,
            env,
            file: config_file_path().display().to_string(),
        })
}

/// Get the default catalog root.
///
/// Returns: ~/.local/share/ledgerline (or platform equivalent)
fn default_root_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ledgerline")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/ledgerline/config.toml
/// - macOS: ~/Library/Application Support/ledgerline/config.toml
/// - Windows: %APPDATA%\ledgerline\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ledgerline")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Ledgerline Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (LEDGER_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Directory scanned (recursively) for audio files. Required.
#
# Can also be set via:
# - CLI: ledgerline scan --songs-dir /music
# - Environment: LEDGER_SONGS_DIR=/music
songs_dir = "/path/to/music"

# Directory receiving deduplicated cover images, named 1.jpg, 2.jpg, ...
# Required.
#
# Can also be set via:
# - CLI: ledgerline scan --images-dir /covers
# - Environment: LEDGER_IMAGES_DIR=/covers
images_dir = "/path/to/covers"

# Directory holding the catalog database (songs.db)
#
# Default: Platform-specific data directory
#root_dir = "/path/to/catalog"

[ingest]
# Worker threads (default: available parallelism, 4 when undetectable)
#workers = 8

# Extension of the audio files to catalog
#extension = "mp3"

# Covers whose perceptual hashes differ by fewer bits are duplicates
#similarity_threshold = 10

# Edge length of saved covers, in pixels, and their JPEG quality
#cover_size = 500
#jpeg_quality = 95

# Songs written per catalog transaction
#batch_size = 64

# Register covers already present in images_dir before scanning
#seed_from_existing_images = true

[logging]
# See the twyg documentation for all options
#level = "info"
#coloured = true
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.root_dir.as_os_str().is_empty());
        assert!(config.songs_dir.is_none());
        assert_eq!(config.ingest.extension, "mp3");
        assert_eq!(config.ingest.similarity_threshold, 10);
    }

    #[test]
    fn test_config_load() {
        // Should not fail even if config file doesn't exist
        let result = Config::load();
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_songs_dir_is_fatal() {
        let config = Config::default();
        let err = config.paths().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "songs_dir", .. }));
    }

    #[test]
    fn test_empty_images_dir_is_fatal() {
        let config = Config::default().with_overrides(
            Some(PathBuf::from("/music")),
            Some(PathBuf::new()),
            None,
            None,
        );
        let err = config.paths().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "images_dir", .. }));
    }

    #[test]
    fn test_overrides_resolve_paths() {
        let config = Config::default().with_overrides(
            Some(PathBuf::from("/music")),
            Some(PathBuf::from("/covers")),
            Some(PathBuf::from("/catalog")),
            Some(3),
        );
        let paths = config.paths().unwrap();
        assert_eq!(paths.songs_dir, PathBuf::from("/music"));
        assert_eq!(paths.catalog_path(), PathBuf::from("/catalog/songs.db"));
        assert_eq!(config.ingest.workers, Some(3));
    }

    #[test]
    fn test_ingest_validation() {
        assert!(IngestConfig::default().validate().is_ok());

        let bad_quality = IngestConfig {
            jpeg_quality: 0,
            ..IngestConfig::default()
        };
        assert!(bad_quality.validate().is_err());

        let bad_batch = IngestConfig {
            batch_size: 0,
            ..IngestConfig::default()
        };
        assert!(bad_batch.validate().is_err());
    }

    #[test]
    fn test_example_config_parses() {
        #[derive(Deserialize)]
        struct Probe {
            songs_dir: String,
            ingest: IngestConfig,
        }

        let parsed: Probe = toml::from_str(example_config()).unwrap();
        assert_eq!(parsed.songs_dir, "/path/to/music");
        assert_eq!(parsed.ingest, IngestConfig::default());
    }
}
