//! Error types for the ingestion pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while processing a single file.
///
/// The dispatcher contains every one of these at the file boundary; none of
/// them stops a worker.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The file could not be opened or is not a valid audio container.
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// The file parsed but carries no ID3v2 tag.
    #[error("{path} has no ID3v2 tag")]
    MissingTag { path: PathBuf },

    /// Writing the catalog identifier back into the file failed.
    #[error("failed to save tag of {path}: {reason}")]
    SaveFailed { path: PathBuf, reason: String },

    /// The embedded picture could not be decoded or re-encoded.
    #[error("artwork error: {0}")]
    Artwork(#[from] image::ImageError),

    /// A deduplicated cover could not be written to the images directory.
    #[error("failed to write cover {path}: {source}")]
    CoverWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An error propagated from the catalog layer.
    #[error("catalog error: {0}")]
    Catalog(#[from] ledgerline_core::Error),

    /// Processing the file panicked.
    #[error("unexpected failure: {0}")]
    Panicked(String),
}

impl IngestError {
    /// Whether the failure counts towards the run's error total.
    ///
    /// Artwork problems only cost the song its cover.
    pub fn counts_as_error(&self) -> bool {
        !matches!(self, Self::Artwork(_) | Self::CoverWrite { .. })
    }
}

/// Convenience alias for per-file results.
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Invalid or incomplete configuration; fatal before any worker starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{key}` (set it in {file} or via {env})")]
    Missing {
        key: &'static str,
        env: &'static str,
        file: String,
    },

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artwork_failures_are_not_counted() {
        let err = IngestError::CoverWrite {
            path: PathBuf::from("/img/1.jpg"),
            source: std::io::Error::other("disk full"),
        };
        assert!(!err.counts_as_error());
    }

    #[test]
    fn test_file_failures_are_counted() {
        let err = IngestError::MissingTag {
            path: PathBuf::from("/music/a.mp3"),
        };
        assert!(err.counts_as_error());
        assert!(IngestError::Panicked("boom".to_string()).counts_as_error());
    }
}
