use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Audit entry for one batch of newly minted catalog identifiers.
///
/// Rows of `log_additions` are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAddition {
    /// Surrogate key, `None` until the entry has been stored.
    pub id: Option<i64>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// First identifier of the batch (inclusive).
    pub first_id: u64,
    /// Last identifier of the batch (inclusive).
    pub last_id: u64,
    pub comment: String,
}

impl LogAddition {
    /// Build an entry dated `date`. Fails when `first_id > last_id`.
    pub fn new(
        date: NaiveDate,
        first_id: u64,
        last_id: u64,
        comment: impl Into<String>,
    ) -> Result<Self> {
        if first_id > last_id {
            return Err(Error::InvalidRange {
                first: first_id,
                last: last_id,
            });
        }
        Ok(Self {
            id: None,
            year: date.year(),
            month: date.month(),
            day: date.day(),
            first_id,
            last_id,
            comment: comment.into(),
        })
    }

    /// Build an entry dated with the local calendar day.
    pub fn today(first_id: u64, last_id: u64, comment: impl Into<String>) -> Result<Self> {
        Self::new(Local::now().date_naive(), first_id, last_id, comment)
    }

    /// Number of identifiers covered by the entry.
    #[must_use]
    pub const fn id_count(&self) -> u64 {
        self.last_id - self.first_id + 1
    }
}
