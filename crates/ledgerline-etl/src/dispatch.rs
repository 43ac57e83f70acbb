//! Worker pool driving files through tagging, artwork and the catalog.
//!
//! The file list is split into one contiguous range per worker. Every
//! worker owns its catalog handle and shares the [`IdAllocator`], the
//! [`DedupStore`] and the [`RunStatistics`] of the run.

use anyhow::{Context, Result};
use ledgerline_core::{Catalog, LogAddition, SongRecord, UpsertOutcome};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::allocator::IdAllocator;
use crate::artwork::{cover_path, prepare_cover, Admission, DedupStore, PerceptualHasher};
use crate::config::{IngestConfig, LibraryPaths};
use crate::error::{IngestError, IngestResult};
use crate::progress::{NoProgress, ProgressCounter, ProgressSink};
use crate::stats::{RunStatistics, StatsSnapshot};
use crate::tagging::{TagAccessor, CATALOG_ID_KEY};

/// Pool size when the host's parallelism cannot be determined.
pub const DEFAULT_WORKERS: usize = 4;

/// Number of workers for a run: the configured count, or one per
/// available core.
pub fn worker_count(configured: Option<usize>) -> usize {
    configured.filter(|n| *n > 0).unwrap_or_else(|| {
        thread::available_parallelism().map_or(DEFAULT_WORKERS, std::num::NonZeroUsize::get)
    })
}

/// Range of file indices handled by worker `index` out of `workers`.
///
/// Every range holds `total / workers` files; the last one also takes the
/// remainder.
pub fn partition(total: usize, workers: usize, index: usize) -> Range<usize> {
    let workers = workers.max(1);
    let chunk = total / workers;
    let start = (index * chunk).min(total);
    let end = if index + 1 >= workers {
        total
    } else {
        start + chunk
    };
    start..end
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub total_files: usize,
    pub workers: usize,
    pub stats: StatsSnapshot,
    /// First and last identifier minted during the run.
    pub minted: Option<(u64, u64)>,
    /// Covers linked by the reconciliation pass.
    pub covers_reconciled: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} files with {} workers in {:.3}s: {}",
            self.total_files,
            self.workers,
            self.elapsed.as_secs_f64(),
            self.stats
        )?;
        if let Some((first, last)) = self.minted {
            write!(f, " (ids {first}-{last})")?;
        }
        Ok(())
    }
}

/// Opens the catalog handle of one worker.
type Connect = fn(&Path) -> ledgerline_core::Result<Catalog>;

/// Drives one ingestion run over a list of files.
#[derive(Debug)]
pub struct Dispatcher<A> {
    accessor: A,
    paths: LibraryPaths,
    settings: IngestConfig,
    progress: Box<dyn ProgressSink>,
    connect: Connect,
}

impl<A: TagAccessor> Dispatcher<A> {
    #[must_use]
    pub fn new(accessor: A, paths: LibraryPaths, settings: IngestConfig) -> Self {
        Self {
            accessor,
            paths,
            settings,
            progress: Box::new(NoProgress),
            connect: |path| Catalog::connect(path),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[cfg(test)]
    fn with_connect(mut self, connect: Connect) -> Self {
        self.connect = connect;
        self
    }

    /// Process `files` and record the run in the catalog.
    ///
    /// Only failing to prepare the catalog or the images directory aborts
    /// the run. Per-file failures end up in the report's error count.
    pub fn run(&self, files: &[PathBuf]) -> Result<RunReport> {
        let started = Instant::now();
        let catalog_path = self.paths.catalog_path();

        let catalog = Catalog::open(&catalog_path)
            .with_context(|| format!("Failed to open catalog {}", catalog_path.display()))?;
        let seed = catalog
            .current_max_id()?
            .max(catalog.last_recorded_id()?);
        let allocator = IdAllocator::new(seed);

        fs::create_dir_all(&self.paths.images_dir).with_context(|| {
            format!(
                "Failed to create images directory {}",
                self.paths.images_dir.display()
            )
        })?;

        let store = DedupStore::new(self.settings.similarity_threshold);
        if self.settings.seed_from_existing_images {
            match store.seed_from_directory(&self.paths.images_dir) {
                Ok(0) => {}
                Ok(seeded) => log::info!("Registered {} existing covers", seeded),
                Err(e) => log::warn!(
                    "Could not read existing covers in {}: {}",
                    self.paths.images_dir.display(),
                    e
                ),
            }
        }

        let workers = worker_count(self.settings.workers);
        log::info!(
            "Cataloging {} files with {} workers (last id {})",
            files.len(),
            workers,
            seed
        );

        let stats = RunStatistics::new();
        let progress = ProgressCounter::new(self.progress.as_ref(), files.len());
        let run = WorkerContext {
            accessor: &self.accessor,
            settings: &self.settings,
            catalog_path: &catalog_path,
            connect: self.connect,
            images_dir: &self.paths.images_dir,
            allocator: &allocator,
            store: &store,
            stats: &stats,
            progress: &progress,
            covers: Mutex::new(HashMap::new()),
        };

        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|index| (index, partition(files.len(), workers, index)))
                .filter(|(_, range)| !range.is_empty())
                .map(|(index, range)| {
                    let run = &run;
                    let files = &files[range];
                    (index, scope.spawn(move || run.work(index, files)))
                })
                .collect();

            for (index, handle) in handles {
                if handle.join().is_err() {
                    log::error!("Worker {} stopped unexpectedly", index);
                }
            }
        });
        progress.finish();

        let covers = run.covers.into_inner();
        let covers_reconciled = link_pending_covers(&catalog, &covers)
            .context("Failed to link pending covers")?;
        if covers_reconciled > 0 {
            log::info!("Linked {} pending covers", covers_reconciled);
        }

        let minted = allocator.minted_range();
        if let Some((first, last)) = minted {
            let comment = format!(
                "Added {} songs from {}",
                last - first + 1,
                self.paths.songs_dir.display()
            );
            let entry = LogAddition::today(first, last, comment)?;
            catalog
                .record_addition(&entry)
                .context("Failed to record added songs")?;
        }

        let report = RunReport {
            total_files: files.len(),
            workers,
            stats: stats.snapshot(),
            minted,
            covers_reconciled,
            elapsed: started.elapsed(),
        };
        log::info!("{}", report);
        Ok(report)
    }
}

/// Link covers decided during the run to songs still missing one.
pub fn link_pending_covers(
    catalog: &Catalog,
    covers: &HashMap<String, u32>,
) -> ledgerline_core::Result<usize> {
    if covers.is_empty() {
        return Ok(0);
    }

    catalog.with_transaction(|catalog| {
        let mut linked = 0;
        for song in catalog.songs_missing_cover()? {
            if let Some(&index) = covers.get(&song.id) {
                if catalog.link_cover(&song.id, index)? {
                    linked += 1;
                }
            }
        }
        Ok(linked)
    })
}

/// A song ready for the catalog.
#[derive(Debug)]
struct Processed {
    song: SongRecord,
    /// The identifier was minted during this run.
    minted: bool,
}

/// State shared by the workers of one run.
#[derive(Debug)]
struct WorkerContext<'a, A> {
    accessor: &'a A,
    settings: &'a IngestConfig,
    catalog_path: &'a Path,
    connect: Connect,
    images_dir: &'a Path,
    allocator: &'a IdAllocator,
    store: &'a DedupStore,
    stats: &'a RunStatistics,
    progress: &'a ProgressCounter<'a>,
    /// Cover index decided for each song id during the run.
    covers: Mutex<HashMap<String, u32>>,
}

impl<A: TagAccessor> WorkerContext<'_, A> {
    fn work(&self, index: usize, files: &[PathBuf]) {
        let catalog = match (self.connect)(self.catalog_path) {
            Ok(catalog) => catalog,
            Err(e) => {
                log::error!(
                    "Worker {} cannot open the catalog, skipping {} files: {}",
                    index,
                    files.len(),
                    e
                );
                for _ in files {
                    self.stats.record_error();
                    self.progress.advance();
                }
                return;
            }
        };

        log::debug!("Worker {} started on {} files", index, files.len());
        let batch_size = self.settings.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);

        for path in files {
            match self.process_guarded(path) {
                Ok(processed) => batch.push(processed),
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    if e.counts_as_error() {
                        self.stats.record_error();
                    }
                }
            }
            self.progress.advance();

            if batch.len() >= batch_size {
                self.flush(&catalog, &mut batch);
            }
        }
        self.flush(&catalog, &mut batch);
        log::debug!("Worker {} finished", index);
    }

    /// Process one file, turning a panic into an error for that file.
    fn process_guarded(&self, path: &Path) -> IngestResult<Processed> {
        panic::catch_unwind(AssertUnwindSafe(|| self.process_file(path))).unwrap_or_else(
            |payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| String::from("unknown panic"));
                Err(IngestError::Panicked(message))
            },
        )
    }

    fn process_file(&self, path: &Path) -> IngestResult<Processed> {
        log::debug!("Processing {}", path.display());
        let contents = self.accessor.read_frames(path)?;
        let mut tags = contents.tag_map();

        let (id, minted) = match contents.catalog_id() {
            Some(id) => (id.to_string(), false),
            None => {
                let id = self.allocator.allocate().to_string();
                if let Err(e) = self.accessor.add_text_frame(path, CATALOG_ID_KEY, &id) {
                    log::warn!("Identifier {} consumed by {}", id, path.display());
                    return Err(e);
                }
                tags.entry(format!("TXXX:{CATALOG_ID_KEY}"))
                    .or_default()
                    .push(id.clone());
                self.stats.record_new_file();
                log::info!("Adding new song {}: {}", id, path.display());
                (id, true)
            }
        };

        let mut song = contents.to_song(&id, path, &tags)?;

        if let Some(picture) = contents.picture() {
            match self.store_cover(picture) {
                Ok(index) => {
                    song.cover = Some(index);
                    self.covers.lock().insert(id, index);
                }
                Err(e) => log::warn!("No cover for {}: {}", path.display(), e),
            }
        }

        Ok(Processed { song, minted })
    }

    /// Deduplicate an embedded picture and save it when it is new.
    ///
    /// Returns the cover index the song links to.
    fn store_cover(&self, picture: &[u8]) -> IngestResult<u32> {
        let cover = prepare_cover(
            picture,
            self.settings.cover_size,
            self.settings.jpeg_quality,
        )?;
        let hash = self.store.hasher().hash(&cover.gray);

        let admission = self.store.admit_with(hash, |index| {
            let path = cover_path(self.images_dir, index);
            fs::write(&path, &cover.jpeg).map_err(|source| IngestError::CoverWrite { path, source })
        })?;

        match admission {
            Admission::Admitted(index) => {
                self.stats.record_new_image();
                Ok(index)
            }
            Admission::Duplicate { of, distance } => {
                log::debug!("Cover {} is a duplicate of {} (distance {})", hash, of, distance);
                Ok(of)
            }
        }
    }

    /// Write the buffered songs in one transaction, one savepoint each.
    ///
    /// Songs with a minted identifier were already counted as new when the
    /// identifier was saved; every other stored song counts as updated.
    fn flush(&self, catalog: &Catalog, batch: &mut Vec<Processed>) {
        if batch.is_empty() {
            return;
        }

        let committed = catalog.with_transaction(|catalog| {
            Ok::<_, ledgerline_core::Error>(
                batch
                    .iter()
                    .map(|item| catalog.with_savepoint(|catalog| catalog.upsert(&item.song)))
                    .collect::<Vec<_>>(),
            )
        });

        match committed {
            Ok(outcomes) => {
                for (item, outcome) in batch.iter().zip(outcomes) {
                    match outcome {
                        Ok(_) if item.minted => {}
                        Ok(UpsertOutcome::Inserted) => {
                            log::info!("Re-imported song {}: {}", item.song.id, item.song.path);
                            self.stats.record_updated_file();
                        }
                        Ok(UpsertOutcome::Updated) => self.stats.record_updated_file(),
                        Err(e) => {
                            log::warn!("Failed to store {}: {}", item.song.path, e);
                            self.stats.record_error();
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("Failed to commit {} songs: {}", batch.len(), e);
                for _ in batch.iter() {
                    self.stats.record_error();
                }
            }
        }
        batch.clear();
    }
}
