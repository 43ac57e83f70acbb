//! Cover art: decoding, perceptual hashing and near-duplicate detection.

pub mod codec;
pub mod dedup;
pub mod phash;

pub use codec::{cover_file_name, cover_path, prepare_cover, PreparedCover, COVER_EXTENSION};
pub use dedup::{Admission, DedupStore};
pub use phash::{DctHasher, ImageHash, PerceptualHasher};
