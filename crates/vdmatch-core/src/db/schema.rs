//! Catalog index schema.
//!
//! - `catalog` is an FTS5 table with the trigram tokenizer, which gives the
//!   substring and OCR-typo tolerance the retrieval strategies rely on. Only
//!   `search_blob`, `author` and `title` are indexed; the rest ride along.
//! - `catalog_meta` records the schema version and the last build.

/// Migration v1: catalog FTS5 table plus build metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS catalog_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    record_count INTEGER NOT NULL DEFAULT 0,
    built_at_secs INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO catalog_meta (id, schema_version) VALUES (1, 0);

CREATE VIRTUAL TABLE IF NOT EXISTS catalog USING fts5(
    search_blob,
    author,
    title,
    year UNINDEXED,
    place UNINDEXED,
    identifier UNINDEXED,
    tokenize = 'trigram'
);
";
