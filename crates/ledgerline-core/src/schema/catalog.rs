use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{LogAddition, SongRecord, UpsertOutcome};

use super::migrations::MIGRATIONS;

/// File name of the catalog inside the catalog root directory.
pub const CATALOG_FILE_NAME: &str = "songs.db";

/// How long a write waits for another worker's transaction to finish.
const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

const SONG_COLUMNS: &str = "id, title, artist, album, cover, duration, tags, path";

/// A handle on the catalog store.
///
/// Each worker owns its own handle; a `Catalog` is never shared between
/// threads.
#[derive(Debug)]
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (or create) the catalog at `path` and apply pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let catalog = Self::connect(path)?;
        catalog.initialize_schema()?;
        Ok(catalog)
    }

    /// Open a handle on an existing catalog without touching the schema.
    ///
    /// Workers use this once the schema has been initialized for the run.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| Error::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Ok(Self { conn })
    }

    /// Open an in-memory catalog (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let catalog = Self {
            conn: Connection::open_in_memory()?,
        };
        catalog.initialize_schema()?;
        Ok(catalog)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Ensure the `songs` and `log_additions` tables exist.
    ///
    /// Safe to call repeatedly and from several handles at once: pending
    /// migrations are applied under an immediate transaction.
    pub fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )?;

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let applied: Vec<u32> = {
            let mut stmt = tx.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
            let versions = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            versions
        };

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                tx.execute_batch(migration.sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    params![migration.version, migration.name],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Run `work` inside one transaction.
    ///
    /// Everything `work` writes through `self` commits together, or is
    /// rolled back when `work` fails.
    pub fn with_transaction<T, E, F>(&self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(|e| E::from(Error::from(e)))?;
        let value = work(self)?;
        tx.commit().map_err(|e| E::from(Error::from(e)))?;
        Ok(value)
    }

    /// Run `work` inside a savepoint of the current transaction.
    ///
    /// A failure rolls back only what `work` wrote; the enclosing
    /// transaction stays usable.
    pub fn with_savepoint<T, E, F>(&self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.conn
            .execute_batch("SAVEPOINT song_write")
            .map_err(|e| E::from(Error::from(e)))?;

        match work(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("RELEASE song_write")
                    .map_err(|e| E::from(Error::from(e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch("ROLLBACK TO song_write; RELEASE song_write")
                {
                    log::warn!("Failed to roll back savepoint: {}", rollback);
                }
                Err(err)
            }
        }
    }
}

// Songs
impl Catalog {
    /// Highest numeric song identifier, or 0 for an empty catalog.
    pub fn current_max_id(&self) -> Result<u64> {
        let max: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(CAST(id AS INTEGER)), 0) FROM songs",
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(max).unwrap_or(0))
    }

    /// Update the row for `song.id`, or insert it when none exists.
    ///
    /// The update runs first so an existing row is always reported as
    /// [`UpsertOutcome::Updated`]. A cover that is already linked is kept.
    pub fn upsert(&self, song: &SongRecord) -> Result<UpsertOutcome> {
        let updated = self
            .conn
            .prepare_cached(
                "UPDATE songs SET
                    title = ?2, artist = ?3, album = ?4,
                    cover = COALESCE(cover, ?5),
                    duration = ?6, tags = ?7, path = ?8
                 WHERE id = ?1",
            )?
            .execute(params![
                song.id,
                song.title,
                song.artist,
                song.album,
                song.cover,
                song.duration,
                song.tags,
                song.path,
            ])?;

        if updated > 0 {
            return Ok(UpsertOutcome::Updated);
        }

        self.conn
            .prepare_cached(
                "INSERT INTO songs (id, title, artist, album, cover, duration, tags, path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?
            .execute(params![
                song.id,
                song.title,
                song.artist,
                song.album,
                song.cover,
                song.duration,
                song.tags,
                song.path,
            ])?;

        Ok(UpsertOutcome::Inserted)
    }

    /// Set the cover of song `id` if it has none yet.
    ///
    /// Returns `false` when the song already had a cover or does not exist.
    pub fn link_cover(&self, id: &str, cover: u32) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE songs SET cover = ?2 WHERE id = ?1 AND cover IS NULL",
            params![id, cover],
        )?;
        Ok(changed > 0)
    }

    /// Fetch one song.
    pub fn song(&self, id: &str) -> Result<Option<SongRecord>> {
        let song = self
            .conn
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?1"),
                [id],
                row_to_song,
            )
            .optional()?;
        Ok(song)
    }

    /// List songs without a linked cover, ordered by id.
    pub fn songs_missing_cover(&self) -> Result<Vec<SongRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SONG_COLUMNS} FROM songs WHERE cover IS NULL ORDER BY id"
        ))?;

        let songs = stmt
            .query_map([], row_to_song)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(songs)
    }

    pub fn song_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

// Log additions
impl Catalog {
    /// Append an audit entry and return its surrogate key.
    pub fn record_addition(&self, entry: &LogAddition) -> Result<i64> {
        if entry.first_id > entry.last_id {
            return Err(Error::InvalidRange {
                first: entry.first_id,
                last: entry.last_id,
            });
        }

        self.conn.execute(
            "INSERT INTO log_additions (year, month, day, first_id, last_id, comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.year,
                entry.month,
                entry.day,
                entry.first_id as i64,
                entry.last_id as i64,
                entry.comment,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Highest identifier covered by any audit entry, or 0 when none exist.
    ///
    /// Identifiers written into files whose rows never reached the catalog
    /// are still covered here.
    pub fn last_recorded_id(&self) -> Result<u64> {
        let last: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(last_id), 0) FROM log_additions",
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(last).unwrap_or(0))
    }

    /// All audit entries, oldest first.
    pub fn additions(&self) -> Result<Vec<LogAddition>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, year, month, day, first_id, last_id, comment
             FROM log_additions
             ORDER BY id",
        )?;

        let entries = stmt
            .query_map([], |row| {
                Ok(LogAddition {
                    id: row.get(0)?,
                    year: row.get(1)?,
                    month: row.get(2)?,
                    day: row.get(3)?,
                    first_id: row.get::<_, i64>(4)? as u64,
                    last_id: row.get::<_, i64>(5)? as u64,
                    comment: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }
}

fn row_to_song(row: &rusqlite::Row) -> rusqlite::Result<SongRecord> {
    Ok(SongRecord {
        id: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        artist: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        album: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        cover: row
            .get::<_, Option<i64>>(4)?
            .and_then(|cover| u32::try_from(cover).ok()),
        duration: row.get::<_, Option<f64>>(5)?.unwrap_or_default(),
        tags: row
            .get::<_, Option<String>>(6)?
            .unwrap_or_else(|| String::from("{}")),
        path: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: &str) -> SongRecord {
        let mut song = SongRecord::new(id, format!("/music/{id}.mp3"));
        song.title = format!("Title {id}");
        song.artist = "Artist".to_string();
        song.duration = 180.5;
        song
    }

    #[test]
    fn test_open_in_memory_applies_migrations() {
        let catalog = Catalog::open_in_memory().unwrap();
        let count: i64 = catalog
            .conn()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_initialize_schema_is_idempotent() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.upsert(&song("1")).unwrap();
        catalog.initialize_schema().unwrap();
        catalog.initialize_schema().unwrap();
        assert_eq!(catalog.song_count().unwrap(), 1);
    }

    #[test]
    fn test_current_max_id() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert_eq!(catalog.current_max_id().unwrap(), 0);

        for id in ["2", "10", "9"] {
            catalog.upsert(&song(id)).unwrap();
        }
        // Numeric, not lexicographic
        assert_eq!(catalog.current_max_id().unwrap(), 10);
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let catalog = Catalog::open_in_memory().unwrap();
        let record = song("1");

        assert_eq!(catalog.upsert(&record).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(catalog.upsert(&record).unwrap(), UpsertOutcome::Updated);
        assert_eq!(catalog.song_count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_overwrites_fields() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.upsert(&song("1")).unwrap();

        let mut moved = song("1");
        moved.path = "/elsewhere/1.mp3".to_string();
        moved.title = "Renamed".to_string();
        catalog.upsert(&moved).unwrap();

        let stored = catalog.song("1").unwrap().unwrap();
        assert_eq!(stored.path, "/elsewhere/1.mp3");
        assert_eq!(stored.title, "Renamed");
    }

    #[test]
    fn test_upsert_keeps_linked_cover() {
        let catalog = Catalog::open_in_memory().unwrap();
        let mut record = song("1");
        record.cover = Some(3);
        catalog.upsert(&record).unwrap();

        record.cover = None;
        catalog.upsert(&record).unwrap();
        assert_eq!(catalog.song("1").unwrap().unwrap().cover, Some(3));

        record.cover = Some(8);
        catalog.upsert(&record).unwrap();
        assert_eq!(catalog.song("1").unwrap().unwrap().cover, Some(3));
    }

    #[test]
    fn test_link_cover_is_one_shot() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.upsert(&song("1")).unwrap();

        assert!(catalog.link_cover("1", 4).unwrap());
        assert!(!catalog.link_cover("1", 9).unwrap());
        assert_eq!(catalog.song("1").unwrap().unwrap().cover, Some(4));
    }

    #[test]
    fn test_link_cover_unknown_song_is_noop() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(!catalog.link_cover("404", 1).unwrap());
        assert_eq!(catalog.song_count().unwrap(), 0);
    }

    #[test]
    fn test_songs_missing_cover() {
        let catalog = Catalog::open_in_memory().unwrap();
        for id in ["1", "2", "3"] {
            catalog.upsert(&song(id)).unwrap();
        }
        catalog.link_cover("2", 1).unwrap();

        let missing: Vec<String> = catalog
            .songs_missing_cover()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(missing, vec!["1", "3"]);
    }

    #[test]
    fn test_record_addition_appends() {
        let catalog = Catalog::open_in_memory().unwrap();
        let first = LogAddition::today(1, 10, "first").unwrap();
        let second = LogAddition::today(11, 12, "second").unwrap();

        let id1 = catalog.record_addition(&first).unwrap();
        let id2 = catalog.record_addition(&second).unwrap();
        assert!(id2 > id1);

        let entries = catalog.additions().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].first_id, 1);
        assert_eq!(entries[0].last_id, 10);
        assert_eq!(entries[1].comment, "second");
        assert_eq!(entries[1].id, Some(id2));
    }

    #[test]
    fn test_last_recorded_id() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert_eq!(catalog.last_recorded_id().unwrap(), 0);

        catalog
            .record_addition(&LogAddition::today(1, 12, "").unwrap())
            .unwrap();
        catalog
            .record_addition(&LogAddition::today(13, 14, "").unwrap())
            .unwrap();
        assert_eq!(catalog.last_recorded_id().unwrap(), 14);
    }

    #[test]
    fn test_record_addition_rejects_inverted_range() {
        let catalog = Catalog::open_in_memory().unwrap();
        let mut entry = LogAddition::today(1, 2, "").unwrap();
        entry.first_id = 5;
        assert!(matches!(
            catalog.record_addition(&entry),
            Err(Error::InvalidRange { .. })
        ));
        assert!(catalog.additions().unwrap().is_empty());
    }

    #[test]
    fn test_with_transaction_commits() {
        let catalog = Catalog::open_in_memory().unwrap();
        let outcome = catalog
            .with_transaction(|c| {
                c.upsert(&song("1"))?;
                c.upsert(&song("2"))
            })
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(catalog.song_count().unwrap(), 2);
    }

    #[test]
    fn test_with_transaction_rolls_back_on_error() {
        let catalog = Catalog::open_in_memory().unwrap();
        let result: Result<()> = catalog.with_transaction(|c| {
            c.upsert(&song("1"))?;
            Err(Error::InvalidRange { first: 2, last: 1 })
        });
        assert!(result.is_err());
        assert_eq!(catalog.song_count().unwrap(), 0);
    }

    #[test]
    fn test_savepoint_rolls_back_only_its_own_writes() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .with_transaction(|c| {
                c.with_savepoint(|c| c.upsert(&song("1")))?;
                let failed: Result<()> = c.with_savepoint(|c| {
                    c.upsert(&song("2"))?;
                    Err(Error::InvalidRange { first: 2, last: 1 })
                });
                assert!(failed.is_err());
                c.with_savepoint(|c| c.upsert(&song("3")))?;
                Ok::<_, Error>(())
            })
            .unwrap();

        assert_eq!(catalog.song_count().unwrap(), 2);
        assert!(catalog.song("2").unwrap().is_none());
    }
}
