pub mod log_addition;
pub mod song;

pub use log_addition::LogAddition;
pub use song::{SongRecord, TagMap, UpsertOutcome};
