//! Catalog index build from a JSON-lines metadata harvest.
//!
//! `vdm index build` truncates the catalog table and re-ingests the harvest,
//! so the index is disposable and reproducible from the dump alone. Each
//! harvest line is one work; field selection follows the harvest layout:
//!
//! | Field      | Source keys (first non-empty wins)                                   |
//! |------------|----------------------------------------------------------------------|
//! | title      | `title`, `normalized_title`                                          |
//! | author     | `author_primary`, `authors` (list joined with spaces)                |
//! | year       | first `1400`–`1999` token of `year`                                  |
//! | place      | first of `publication_places`, `place` (string or list)              |
//! | identifier | first `vd_ids` entry containing `VD18`, else first `vd_ids` entry, else `vd18_number`, `vd18`, `vd17_number`, `vd17`, `vd16_number`, `vd16` |

use std::io::BufRead;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;
use serde_json::Value;

use crate::model::{CatalogRecord, extract_year};
use crate::normalize::normalize_for_index;

/// Rows written per transaction.
pub const INSERT_BATCH_SIZE: usize = 10_000;

const MIN_BLOB_LEN: usize = 3;

const IDENTIFIER_FALLBACK_KEYS: &[&str] = &[
    "vd18_number",
    "vd18",
    "vd17_number",
    "vd17",
    "vd16_number",
    "vd16",
];

// ---------------------------------------------------------------------------
// BuildStats
// ---------------------------------------------------------------------------

/// Counters reported after an index build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Non-blank harvest lines read.
    pub read: usize,
    /// Records written to the index.
    pub indexed: usize,
    /// Well-formed lines without an identifier or searchable text.
    pub skipped: usize,
    /// Lines that were not valid JSON objects.
    pub malformed: usize,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Record construction
// ---------------------------------------------------------------------------

/// Build an index record from raw field values.
///
/// Text fields are normalized for index lookup and the year is reduced to
/// its first plausible four-digit token. Returns `None` when the identifier
/// is blank or the combined search text is too short to be found.
#[must_use]
pub fn catalog_record(
    identifier: &str,
    author: &str,
    title: &str,
    year: &str,
    place: &str,
) -> Option<CatalogRecord> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return None;
    }

    let author = normalize_for_index(author);
    let title = normalize_for_index(title);
    let place = normalize_for_index(place);
    let year = extract_year(year).map(|y| y.to_string()).unwrap_or_default();

    let search_blob = [author.as_str(), title.as_str(), year.as_str(), place.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if search_blob.len() < MIN_BLOB_LEN {
        return None;
    }

    Some(CatalogRecord {
        identifier: identifier.to_string(),
        author: Some(author).filter(|s| !s.is_empty()),
        title: Some(title).filter(|s| !s.is_empty()),
        year: Some(year).filter(|s| !s.is_empty()),
        place: Some(place).filter(|s| !s.is_empty()),
        search_blob,
    })
}

/// Map one parsed harvest line to an index record.
#[must_use]
pub fn record_from_harvest(data: &Value) -> Option<CatalogRecord> {
    let title = first_text(data, &["title", "normalized_title"]);

    let author = match scalar_text(data.get("author_primary")) {
        Some(primary) => primary,
        None => match data.get("authors") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| scalar_text(Some(v)))
                .collect::<Vec<_>>()
                .join(" "),
            other => scalar_text(other).unwrap_or_default(),
        },
    };

    let year = data.get("year").map(value_text).unwrap_or_default();

    let place = ["publication_places", "place"]
        .iter()
        .find_map(|key| first_scalar(data.get(*key)))
        .unwrap_or_default();

    let identifier = harvest_identifier(data)?;

    catalog_record(&identifier, &author, &title, &year, &place)
}

fn harvest_identifier(data: &Value) -> Option<String> {
    if let Some(Value::Array(ids)) = data.get("vd_ids") {
        if !ids.is_empty() {
            let texts: Vec<String> = ids.iter().map(value_text).collect();
            return texts
                .iter()
                .find(|id| id.contains("VD18"))
                .or_else(|| texts.first())
                .cloned()
                .filter(|id| !id.trim().is_empty());
        }
    }

    IDENTIFIER_FALLBACK_KEYS
        .iter()
        .find_map(|key| first_scalar(data.get(*key)))
}

fn first_text(data: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| scalar_text(data.get(*key)))
        .unwrap_or_default()
}

/// Non-empty trimmed text of a scalar value.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        other => Some(value_text(other)).filter(|s| !s.trim().is_empty()),
    }
}

/// First non-empty scalar of a value that may be a list or a scalar.
fn first_scalar(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::Array(items) => items.iter().find_map(|v| scalar_text(Some(v))),
        other => scalar_text(Some(other)),
    };
    text.map(|s| s.trim().to_string())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Insert records in a single transaction.
///
/// # Errors
///
/// Returns an error if any insert fails; the transaction is rolled back.
pub fn insert_records(conn: &mut Connection, records: &[CatalogRecord]) -> Result<()> {
    let tx = conn.transaction().context("begin catalog insert")?;
    {
        let mut stmt = tx
            .prepare_cached(
                "INSERT INTO catalog (search_blob, author, title, year, place, identifier) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .context("prepare catalog insert")?;
        for record in records {
            stmt.execute(params![
                record.search_blob,
                record.author.as_deref().unwrap_or_default(),
                record.title.as_deref().unwrap_or_default(),
                record.year.as_deref().unwrap_or_default(),
                record.place.as_deref().unwrap_or_default(),
                record.identifier,
            ])
            .with_context(|| format!("insert catalog record {}", record.identifier))?;
        }
    }
    tx.commit().context("commit catalog insert")?;
    Ok(())
}

/// Replace the catalog contents with the records of a JSON-lines harvest.
///
/// Malformed lines are counted and skipped; they never abort the build.
/// The FTS5 index is optimized once all rows are in.
///
/// # Errors
///
/// Returns an error if reading the harvest or writing the index fails.
pub fn build_catalog<R: BufRead>(conn: &mut Connection, reader: R) -> Result<BuildStats> {
    let start = Instant::now();
    let mut stats = BuildStats::default();

    conn.execute("DELETE FROM catalog", [])
        .context("clear existing catalog rows")?;

    let mut batch = Vec::with_capacity(INSERT_BATCH_SIZE);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read harvest line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        stats.read += 1;

        let data: Value = match serde_json::from_str(&line) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => {
                stats.malformed += 1;
                tracing::warn!(line = line_no + 1, "harvest line is not a JSON object");
                continue;
            }
            Err(e) => {
                stats.malformed += 1;
                tracing::warn!(line = line_no + 1, error = %e, "skipping malformed harvest line");
                continue;
            }
        };

        let Some(record) = record_from_harvest(&data) else {
            stats.skipped += 1;
            continue;
        };
        batch.push(record);

        if batch.len() >= INSERT_BATCH_SIZE {
            insert_records(conn, &batch)?;
            stats.indexed += batch.len();
            tracing::debug!(indexed = stats.indexed, "catalog batch committed");
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_records(conn, &batch)?;
        stats.indexed += batch.len();
    }

    conn.execute("INSERT INTO catalog(catalog) VALUES('optimize')", [])
        .context("optimize catalog index")?;

    let built_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
    conn.execute(
        "UPDATE catalog_meta SET record_count = ?1, built_at_secs = ?2 WHERE id = 1",
        params![i64::try_from(stats.indexed).unwrap_or(i64::MAX), built_at],
    )
    .context("record catalog build metadata")?;

    stats.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        read = stats.read,
        indexed = stats.indexed,
        skipped = stats.skipped,
        malformed = stats.malformed,
        elapsed_ms = stats.elapsed_ms,
        "catalog build complete"
    );

    Ok(stats)
}

/// Build metadata stored alongside the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogMeta {
    pub schema_version: u32,
    pub record_count: u64,
    pub built_at_secs: i64,
}

/// Read the `catalog_meta` row.
///
/// # Errors
///
/// Returns an error if the metadata table is missing.
pub fn catalog_meta(conn: &Connection) -> Result<CatalogMeta> {
    conn.query_row(
        "SELECT schema_version, record_count, built_at_secs FROM catalog_meta WHERE id = 1",
        [],
        |row| {
            let version: i64 = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok(CatalogMeta {
                schema_version: u32::try_from(version).unwrap_or(0),
                record_count: u64::try_from(count).unwrap_or(0),
                built_at_secs: row.get(2)?,
            })
        },
    )
    .context("read catalog metadata")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fts, migrations};
    use serde_json::json;

    fn fresh_db() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn catalog_record_normalizes_fields() {
        let record = catalog_record("VD18 10225986", "Frölich", "De Peſte", "Leipzig 1702", "Leipzig")
            .expect("record");
        assert_eq!(record.author.as_deref(), Some("frolich"));
        assert_eq!(record.title.as_deref(), Some("de peste"));
        assert_eq!(record.year.as_deref(), Some("1702"));
        assert_eq!(record.place.as_deref(), Some("leipzig"));
        assert_eq!(record.search_blob, "frolich de peste 1702 leipzig");
    }

    #[test]
    fn catalog_record_rejects_blank_identifier_and_short_blob() {
        assert!(catalog_record("  ", "a", "title", "", "").is_none());
        assert!(catalog_record("VD18 1", "", "ab", "", "").is_none());
        assert!(catalog_record("VD18 1", "", "", "", "").is_none());
    }

    #[test]
    fn harvest_prefers_vd18_identifier() {
        let data = json!({
            "title": "Kurtze Nachricht",
            "authors": ["Müller", "Jöcher"],
            "year": "[ca. 1720]",
            "publication_places": ["Halle", "Leipzig"],
            "vd_ids": ["VD17 1:2345X", "VD18 90000001"]
        });
        let record = record_from_harvest(&data).expect("record");
        assert_eq!(record.identifier, "VD18 90000001");
        assert_eq!(record.author.as_deref(), Some("muller jocher"));
        assert_eq!(record.year.as_deref(), Some("1720"));
        assert_eq!(record.place.as_deref(), Some("halle"));
    }

    #[test]
    fn harvest_falls_back_to_numbered_keys() {
        let data = json!({
            "normalized_title": "De Peste",
            "author_primary": "Frölich",
            "place": "Leipzig",
            "vd17_number": ["", "VD17 3:1234Y"]
        });
        let record = record_from_harvest(&data).expect("record");
        assert_eq!(record.identifier, "VD17 3:1234Y");
        assert_eq!(record.title.as_deref(), Some("de peste"));
        assert!(record.year.is_none());
    }

    #[test]
    fn harvest_without_identifier_is_skipped() {
        let data = json!({"title": "Ohne Nummer", "year": 1701});
        assert!(record_from_harvest(&data).is_none());
    }

    #[test]
    fn build_counts_every_outcome() {
        let harvest = [
            r#"{"title": "Wunder-Erzehlung", "year": "1703", "vd_ids": ["VD18 1"]}"#,
            "",
            r#"{"title": "Ohne Nummer"}"#,
            "{not json",
            "[1, 2]",
            r#"{"title": "Kirchen-Ordnung", "authors": "Sachsen", "vd18": "VD18 2"}"#,
        ]
        .join("\n");

        let mut conn = fresh_db();
        let stats = build_catalog(&mut conn, harvest.as_bytes()).expect("build");
        assert_eq!(stats.read, 5);
        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.malformed, 2);

        assert_eq!(fts::catalog_row_count(&conn).expect("count"), 2);
        let meta = catalog_meta(&conn).expect("meta");
        assert_eq!(meta.record_count, 2);
        assert_eq!(meta.schema_version, migrations::LATEST_SCHEMA_VERSION);
        assert!(meta.built_at_secs > 0);
    }

    #[test]
    fn rebuild_replaces_previous_rows() {
        let mut conn = fresh_db();
        let first = r#"{"title": "Erste Schrift", "vd_ids": ["VD18 1"]}"#;
        let second = r#"{"title": "Zweite Schrift", "vd_ids": ["VD18 2"]}"#;

        build_catalog(&mut conn, first.as_bytes()).expect("first build");
        build_catalog(&mut conn, second.as_bytes()).expect("second build");

        let records = fts::fetch_records(&conn, &["VD18 1", "VD18 2"]).expect("fetch");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "VD18 2");
    }
}
