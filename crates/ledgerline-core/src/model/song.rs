use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Frame key to values, as collected from an audio file's tag.
///
/// A key may repeat inside a tag (several `COMM` frames, for instance), so
/// every key maps to all of its values in tag order.
pub type TagMap = BTreeMap<String, Vec<String>>;

/// One catalogued audio file.
///
/// Corresponds to a row of the `songs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    /// Catalog identifier. Mirrors the identifier embedded in the file and
    /// never changes once assigned.
    pub id: String,

    pub title: String,
    pub artist: String,
    pub album: String,

    /// Index of the saved cover image (`{cover}.jpg` in the images
    /// directory), once one has been linked.
    pub cover: Option<u32>,

    /// Duration in seconds as read from the audio properties.
    pub duration: f64,

    /// JSON-serialized [`TagMap`].
    pub tags: String,

    /// Location of the file at the last scan.
    pub path: String,
}

impl SongRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            cover: None,
            duration: 0.0,
            tags: String::from("{}"),
            path: path.into(),
        }
    }

    /// Replace the tags blob with the serialized form of `tags`.
    pub fn with_tags(mut self, tags: &TagMap) -> Result<Self> {
        self.tags = serde_json::to_string(tags)?;
        Ok(self)
    }

    /// Parse the tags blob back into a map.
    pub fn tag_map(&self) -> Result<TagMap> {
        Ok(serde_json::from_str(&self.tags)?)
    }
}

/// Result of [`Catalog::upsert`](crate::Catalog::upsert).
///
/// `Updated` reports that the row already existed, not that any value
/// changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
