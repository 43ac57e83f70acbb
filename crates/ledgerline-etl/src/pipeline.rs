use anyhow::{Context, Result};

use crate::config::Config;
use crate::discovery::discover_files;
use crate::dispatch::{Dispatcher, RunReport};
use crate::progress::ProgressSink;
use crate::tagging::TagAccessor;

/// Catalog the song directory described by `config`.
///
/// Missing or invalid settings fail before any file is touched.
pub fn ingest_library<A: TagAccessor>(
    config: &Config,
    accessor: A,
    progress: Box<dyn ProgressSink>,
) -> Result<RunReport> {
    let paths = config.paths()?;
    config.ingest.validate()?;

    let files = discover_files(&paths.songs_dir, &config.ingest.extension).with_context(|| {
        format!("Failed to list songs in {}", paths.songs_dir.display())
    })?;
    log::info!(
        "Found {} songs in {}",
        files.len(),
        paths.songs_dir.display()
    );

    Dispatcher::new(accessor, paths, config.ingest.clone())
        .with_progress(progress)
        .run(&files)
}
