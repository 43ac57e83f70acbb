//! Errors raised by the catalog layer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// SQLite rejected a statement or could not open the catalog file.
    #[error("catalog storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("cannot prepare catalog directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed tags blob: {0}")]
    Tags(#[from] serde_json::Error),

    #[error("invalid addition range: first id {first} exceeds last id {last}")]
    InvalidRange { first: u64, last: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
