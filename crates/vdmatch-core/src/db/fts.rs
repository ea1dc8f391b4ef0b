//! Read-only lookups against the `catalog` FTS5 table.
//!
//! # Match expressions
//!
//! Callers pass ready-made FTS5 expressions (see [`and_expression`] /
//! [`or_expression`]). Every token is double-quoted, so catalog words that
//! happen to be FTS5 operators cannot change the query structure. With the
//! trigram tokenizer a quoted token matches as a substring anywhere in the
//! indexed columns.
//!
//! # Ordering
//!
//! | [`RankOrder`]          | SQL ordering                                               |
//! |------------------------|------------------------------------------------------------|
//! | `Relevance`            | `bm25(catalog)` ascending                                  |
//! | `PreferYear(y)`        | rows from `y` first, then `y ± 1`, then the rest; bm25 within each group |

use std::collections::HashMap;
use std::ops::RangeInclusive;

use anyhow::{Context, Result};
use rusqlite::{Connection, Row, ToSql};

use crate::model::CatalogRecord;

/// Result ordering for [`search_catalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    Relevance,
    PreferYear(u16),
}

/// One lookup against the catalog index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSearch<'a> {
    /// FTS5 MATCH expression. Empty expressions return no rows.
    pub expression: &'a str,
    pub order: RankOrder,
    /// Inclusive numeric year filter; rows without a numeric year are excluded.
    pub years: Option<RangeInclusive<u16>>,
    pub limit: u32,
}

/// Join tokens into a conjunctive FTS5 expression (`"a" AND "b"`).
#[must_use]
pub fn and_expression<S: AsRef<str>>(tokens: &[S]) -> String {
    join_quoted(tokens, " AND ")
}

/// Join tokens into a disjunctive FTS5 expression (`"a" OR "b"`).
#[must_use]
pub fn or_expression<S: AsRef<str>>(tokens: &[S]) -> String {
    join_quoted(tokens, " OR ")
}

fn join_quoted<S: AsRef<str>>(tokens: &[S], separator: &str) -> String {
    tokens
        .iter()
        .map(|t| format!("\"{}\"", t.as_ref().replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(separator)
}

const RECORD_COLUMNS: &str = "identifier, author, title, year, place, search_blob";

/// Run one lookup against the catalog index.
///
/// # Errors
///
/// Returns an error if the FTS5 expression is malformed or the catalog table
/// is unreadable.
pub fn search_catalog(conn: &Connection, search: &CatalogSearch<'_>) -> Result<Vec<CatalogRecord>> {
    if search.expression.trim().is_empty() || search.limit == 0 {
        return Ok(Vec::new());
    }

    let limit = i64::from(search.limit);
    let (lo, hi) = search
        .years
        .as_ref()
        .map_or((0, 0), |range| (i64::from(*range.start()), i64::from(*range.end())));
    let (exact, prev, next) = match search.order {
        RankOrder::PreferYear(year) => (
            year.to_string(),
            year.saturating_sub(1).to_string(),
            year.saturating_add(1).to_string(),
        ),
        RankOrder::Relevance => (String::new(), String::new(), String::new()),
    };

    let mut sql = format!("SELECT {RECORD_COLUMNS} FROM catalog WHERE catalog MATCH :expr");
    let mut params: Vec<(&str, &dyn ToSql)> = vec![(":expr", &search.expression)];

    if search.years.is_some() {
        sql.push_str(" AND year <> '' AND CAST(year AS INTEGER) BETWEEN :lo AND :hi");
        params.push((":lo", &lo));
        params.push((":hi", &hi));
    }

    match search.order {
        RankOrder::PreferYear(_) => {
            sql.push_str(
                " ORDER BY CASE WHEN year = :exact THEN 2 \
                 WHEN year = :prev OR year = :next THEN 1 ELSE 0 END DESC, \
                 bm25(catalog) ASC",
            );
            params.push((":exact", &exact));
            params.push((":prev", &prev));
            params.push((":next", &next));
        }
        RankOrder::Relevance => sql.push_str(" ORDER BY bm25(catalog) ASC"),
    }

    sql.push_str(" LIMIT :limit");
    params.push((":limit", &limit));

    let mut stmt = conn
        .prepare(&sql)
        .context("prepare catalog search query")?;
    let rows = stmt
        .query_map(params.as_slice(), record_from_row)
        .with_context(|| format!("execute catalog search for '{}'", search.expression))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row.context("read catalog search hit")?);
    }
    Ok(records)
}

/// Fetch display fields for the given identifiers, in the order requested.
///
/// Identifiers absent from the catalog are skipped. When the catalog holds
/// several rows with the same identifier the first one wins.
///
/// # Errors
///
/// Returns an error if the lookup query fails.
pub fn fetch_records(conn: &Connection, identifiers: &[&str]) -> Result<Vec<CatalogRecord>> {
    if identifiers.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; identifiers.len()].join(",");
    let sql = format!("SELECT {RECORD_COLUMNS} FROM catalog WHERE identifier IN ({placeholders})");
    let mut stmt = conn
        .prepare(&sql)
        .context("prepare catalog record lookup")?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(identifiers.iter()), record_from_row)
        .context("execute catalog record lookup")?;

    let mut by_id: HashMap<String, CatalogRecord> = HashMap::new();
    for row in rows {
        let record = row.context("read catalog record")?;
        by_id.entry(record.identifier.clone()).or_insert(record);
    }

    Ok(identifiers
        .iter()
        .filter_map(|id| by_id.remove(*id))
        .collect())
}

/// Return the number of rows in the catalog index.
///
/// # Errors
///
/// Returns an error if the catalog table is missing or unreadable.
pub fn catalog_row_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM catalog", [], |row| row.get(0))
        .context("count catalog rows")?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogRecord> {
    Ok(CatalogRecord {
        identifier: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
        author: non_empty(row.get(1)?),
        title: non_empty(row.get(2)?),
        year: non_empty(row.get(3)?),
        place: non_empty(row.get(4)?),
        search_blob: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
