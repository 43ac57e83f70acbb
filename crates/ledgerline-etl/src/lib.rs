//! Ingestion pipeline for ledgerline.
//!
//! Walks a song directory, stamps every audio file with a permanent catalog
//! identifier, deduplicates embedded cover art by perceptual hash and writes
//! the results into the catalog, spread over a fixed pool of worker threads.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod allocator;
pub mod artwork;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod stats;
pub mod tagging;

pub use allocator::IdAllocator;
pub use artwork::{Admission, DctHasher, DedupStore, ImageHash, PerceptualHasher};
pub use config::{Config, IngestConfig, LibraryPaths};
pub use discovery::discover_files;
pub use dispatch::{link_pending_covers, partition, worker_count, Dispatcher, RunReport};
pub use error::{ConfigError, IngestError, IngestResult};
pub use pipeline::ingest_library;
pub use progress::{NoProgress, ProgressSink};
pub use stats::{RunStatistics, StatsSnapshot};
pub use tagging::{Frame, Id3Accessor, TagAccessor, TagContents, CATALOG_ID_KEY};
