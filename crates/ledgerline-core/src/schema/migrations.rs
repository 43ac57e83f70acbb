/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- One row per audio file; id mirrors the identifier embedded in the file
CREATE TABLE IF NOT EXISTS songs (
    id TEXT PRIMARY KEY,
    title TEXT,
    artist TEXT,
    album TEXT,
    cover INTEGER DEFAULT NULL,
    duration REAL,
    tags TEXT,
    path TEXT
);

-- Append-only audit of identifier batches
CREATE TABLE IF NOT EXISTS log_additions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    year INTEGER,
    month INTEGER,
    day INTEGER,
    first_id INTEGER,
    last_id INTEGER,
    comment TEXT
);
"#;

const MIGRATION_002: &str = r#"
CREATE INDEX IF NOT EXISTS idx_songs_missing_cover ON songs(id) WHERE cover IS NULL;
"#;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: MIGRATION_001,
    },
    Migration {
        version: 2,
        name: "missing_cover_index",
        sql: MIGRATION_002,
    },
];
