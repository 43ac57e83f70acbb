//! Tests for catalog handles opened on a real file.

use ledgerline_core::schema::CATALOG_FILE_NAME;
use ledgerline_core::{Catalog, SongRecord, UpsertOutcome};
use std::thread;
use tempfile::TempDir;

/// Schema created by one handle is visible to handles opened later
#[test]
fn test_connect_sees_initialized_schema() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("root").join(CATALOG_FILE_NAME);

    let catalog = Catalog::open(&db_path).expect("Failed to open catalog");
    catalog.upsert(&SongRecord::new("1", "/a.mp3")).unwrap();
    drop(catalog);

    let worker = Catalog::connect(&db_path).expect("Failed to connect");
    assert_eq!(worker.current_max_id().unwrap(), 1);
}

/// Reopening an existing catalog keeps its rows
#[test]
fn test_reopen_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join(CATALOG_FILE_NAME);

    Catalog::open(&db_path)
        .unwrap()
        .upsert(&SongRecord::new("5", "/a.mp3"))
        .unwrap();

    let again = Catalog::open(&db_path).unwrap();
    assert_eq!(again.song_count().unwrap(), 1);
    assert_eq!(
        again.upsert(&SongRecord::new("5", "/a.mp3")).unwrap(),
        UpsertOutcome::Updated
    );
}

/// Per-thread handles writing batches concurrently lose no rows
#[test]
fn test_concurrent_handles_write_disjoint_rows() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join(CATALOG_FILE_NAME);
    Catalog::open(&db_path).unwrap();

    thread::scope(|scope| {
        for worker in 0..4u32 {
            let db_path = &db_path;
            scope.spawn(move || {
                let catalog = Catalog::connect(db_path).unwrap();
                catalog
                    .with_transaction(|c| {
                        for n in 0..25u32 {
                            let id = (worker * 100 + n).to_string();
                            c.upsert(&SongRecord::new(id, "/x.mp3"))?;
                        }
                        Ok::<_, ledgerline_core::Error>(())
                    })
                    .unwrap();
            });
        }
    });

    let catalog = Catalog::connect(&db_path).unwrap();
    assert_eq!(catalog.song_count().unwrap(), 100);
    assert_eq!(catalog.current_max_id().unwrap(), 324);
}
