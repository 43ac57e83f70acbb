//! Reading and writing audio-file tags.
//!
//! The pipeline sees a file's tag as a flat list of [`Frame`]s. The
//! [`TagAccessor`] trait is the only place that touches a concrete tag
//! library; [`Id3Accessor`] implements it for MP3 files with lofty.

use ledgerline_core::{SongRecord, TagMap};
use lofty::config::{ParseOptions, WriteOptions};
use lofty::file::AudioFile;
use lofty::id3::v2::Frame as Id3Frame;
use lofty::mpeg::MpegFile;
use lofty::tag::TagExt;
use std::fs::File;
use std::path::Path;

use crate::error::{IngestError, IngestResult};

/// Description of the user text frame holding the catalog identifier.
pub const CATALOG_ID_KEY: &str = "42id";

/// One tag frame, decoded into the shapes the pipeline cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A standard text frame (`TIT2`, `TPE1`, ...) or a comment.
    Text { id: String, value: String },
    /// A user-defined text frame (`TXXX`).
    UserText { description: String, value: String },
    /// An embedded picture (`APIC`).
    Picture {
        mime_type: Option<String>,
        data: Vec<u8>,
    },
    /// Any other frame; only its identifier is kept.
    Other { id: String },
}

/// Everything read from one file's tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagContents {
    pub frames: Vec<Frame>,
    pub duration_secs: f64,
}

impl TagContents {
    /// Value of the first standard text frame with the given id.
    pub fn text(&self, frame_id: &str) -> Option<&str> {
        self.frames.iter().find_map(|frame| match frame {
            Frame::Text { id, value } if id == frame_id => Some(value.as_str()),
            _ => None,
        })
    }

    /// Value of the first user text frame with the given description.
    pub fn user_text(&self, description: &str) -> Option<&str> {
        self.frames.iter().find_map(|frame| match frame {
            Frame::UserText {
                description: d,
                value,
            } if d == description => Some(value.as_str()),
            _ => None,
        })
    }

    /// The catalog identifier embedded in the file, if any.
    pub fn catalog_id(&self) -> Option<&str> {
        self.user_text(CATALOG_ID_KEY)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Bytes of the first embedded picture.
    pub fn picture(&self) -> Option<&[u8]> {
        self.frames.iter().find_map(|frame| match frame {
            Frame::Picture { data, .. } if !data.is_empty() => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Collect the textual frames into a multimap.
    ///
    /// User text frames are keyed `TXXX:<description>`. Pictures and other
    /// binary frames are left out, as are empty standard text values.
    pub fn tag_map(&self) -> TagMap {
        let mut map = TagMap::new();
        for frame in &self.frames {
            match frame {
                Frame::Text { id, value } if !value.is_empty() => {
                    map.entry(id.clone()).or_default().push(value.clone());
                }
                Frame::UserText { description, value } => {
                    map.entry(format!("TXXX:{description}"))
                        .or_default()
                        .push(value.clone());
                }
                _ => {}
            }
        }
        map
    }

    /// Build the catalog row for this file.
    pub fn to_song(&self, id: &str, path: &Path, tags: &TagMap) -> IngestResult<SongRecord> {
        let mut song = SongRecord::new(id, path.to_string_lossy()).with_tags(tags)?;
        song.title = self.text("TIT2").unwrap_or_default().to_string();
        song.artist = self.text("TPE1").unwrap_or_default().to_string();
        song.album = self.text("TALB").unwrap_or_default().to_string();
        song.duration = self.duration_secs;
        Ok(song)
    }
}

/// Access to the tags of audio files on disk.
///
/// Implementations are shared by every worker.
pub trait TagAccessor: Send + Sync {
    /// Read all frames of the file's tag, plus its duration.
    ///
    /// Fails with [`IngestError::Unreadable`] when the file is not a valid
    /// container and [`IngestError::MissingTag`] when it has no tag.
    fn read_frames(&self, path: &Path) -> IngestResult<TagContents>;

    /// Add a user text frame to the file's tag and save the file.
    fn add_text_frame(&self, path: &Path, description: &str, value: &str) -> IngestResult<()>;
}

/// [`TagAccessor`] for MP3 files carrying an ID3v2 tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3Accessor;

impl Id3Accessor {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn read_mpeg(path: &Path) -> IngestResult<MpegFile> {
        let mut file = File::open(path).map_err(|e| IngestError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        MpegFile::read_from(&mut file, ParseOptions::new()).map_err(|e| IngestError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl TagAccessor for Id3Accessor {
    fn read_frames(&self, path: &Path) -> IngestResult<TagContents> {
        let mpeg = Self::read_mpeg(path)?;
        let tag = mpeg.id3v2().ok_or_else(|| IngestError::MissingTag {
            path: path.to_path_buf(),
        })?;

        Ok(TagContents {
            frames: tag.into_iter().map(decode_frame).collect(),
            duration_secs: mpeg.properties().duration().as_secs_f64(),
        })
    }

    fn add_text_frame(&self, path: &Path, description: &str, value: &str) -> IngestResult<()> {
        let mut mpeg = Self::read_mpeg(path)?;
        let tag = mpeg.id3v2_mut().ok_or_else(|| IngestError::MissingTag {
            path: path.to_path_buf(),
        })?;

        tag.insert_user_text(description.to_string(), value.to_string());
        tag.save_to_path(path, WriteOptions::default())
            .map_err(|e| IngestError::SaveFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

fn decode_frame(frame: &Id3Frame<'_>) -> Frame {
    match frame {
        Id3Frame::Text(text) => Frame::Text {
            id: frame.id().as_str().to_string(),
            value: text.value.to_string(),
        },
        Id3Frame::UserText(extended) => Frame::UserText {
            description: extended.description.to_string(),
            value: extended.content.to_string(),
        },
        Id3Frame::Comment(comment) => Frame::Text {
            id: frame.id().as_str().to_string(),
            value: comment.content.to_string(),
        },
        Id3Frame::Picture(attached) => Frame::Picture {
            mime_type: attached
                .picture
                .mime_type()
                .map(|mime| mime.as_str().to_string()),
            data: attached.picture.data().to_vec(),
        },
        other => Frame::Other {
            id: other.id().as_str().to_string(),
        },
    }
}
