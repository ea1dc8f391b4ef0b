//! The four retrieval strategies.
//!
//! Each strategy issues its own index lookups, scores the hits against the
//! [`QueryPlan`] and returns only accepted candidates, best first. A
//! strategy whose preconditions are not met (no index tokens, no year, no
//! author, ...) returns an empty list rather than an error.
//!
//! | Strategy    | Expression         | Filter / order              | Rows | Accept |
//! |-------------|--------------------|-----------------------------|------|--------|
//! | `Primary`   | strict, then broad | prefer query year (strict)  | 500  | 50     |
//! | `Anonymous` | broad              | year ± 3, no catalog author | 300  | 50     |
//! | `Entity`    | broad              | relevance                   | 200  | 50     |
//! | `RareTerm`  | longest 3 tokens   | relevance                   | 100  | 65     |
//!
//! Row caps and thresholds are the defaults of
//! [`vdmatch_core::config::MatchConfig`].

pub mod anonymous;
pub mod entity;
pub mod primary;
pub mod rare_term;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use vdmatch_core::config::MatchConfig;
use vdmatch_core::model::CatalogRecord;
use vdmatch_core::normalize::normalize_for_fuzzy;

use crate::candidate::{Candidate, StrategyKind};
use crate::planner::QueryPlan;

/// Accepted candidates of one strategy, in the order the strategy ranked them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyRun {
    pub strategy: StrategyKind,
    pub candidates: Vec<Candidate>,
}

/// Run a single strategy.
///
/// # Errors
///
/// Returns an error if an index lookup fails.
pub fn run_strategy(
    kind: StrategyKind,
    conn: &Connection,
    plan: &QueryPlan,
    config: &MatchConfig,
) -> Result<StrategyRun> {
    let candidates = match kind {
        StrategyKind::Primary => primary::retrieve(conn, plan, config),
        StrategyKind::Anonymous => anonymous::retrieve(conn, plan, config),
        StrategyKind::Entity => entity::retrieve(conn, plan, config),
        StrategyKind::RareTerm => rare_term::retrieve(conn, plan, config),
    }
    .with_context(|| format!("{kind} retrieval"))?;

    tracing::debug!(strategy = %kind, accepted = candidates.len(), "strategy finished");
    Ok(StrategyRun {
        strategy: kind,
        candidates,
    })
}

/// Run every strategy in [`StrategyKind::ALL`] order.
///
/// # Errors
///
/// Returns the first index lookup failure.
pub fn run_all(conn: &Connection, plan: &QueryPlan, config: &MatchConfig) -> Result<Vec<StrategyRun>> {
    StrategyKind::ALL
        .into_iter()
        .map(|kind| run_strategy(kind, conn, plan, config))
        .collect()
}

/// Fuzzy label of a catalog hit (`author title`).
fn hit_label(record: &CatalogRecord) -> String {
    normalize_for_fuzzy(&record.label())
}

// ---------------------------------------------------------------------------
// Shared test fixtures
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fixtures {
    use rusqlite::Connection;
    use vdmatch_core::db::build::{catalog_record, insert_records};
    use vdmatch_core::db::migrations;
    use vdmatch_core::model::CitationQuery;

    /// `(identifier, author, title, year, place)`
    pub type Row<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str);

    pub fn catalog(rows: &[Row<'_>]) -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        migrations::migrate(&mut conn).expect("migrate");
        let records: Vec<_> = rows
            .iter()
            .map(|(id, author, title, year, place)| {
                catalog_record(id, author, title, year, place).expect("valid record")
            })
            .collect();
        insert_records(&mut conn, &records).expect("insert");
        conn
    }

    pub fn query(author: &str, title: &str, year: &str, place: &str) -> CitationQuery {
        let field = |v: &str| (!v.is_empty()).then(|| v.to_string());
        CitationQuery {
            author: field(author),
            title: field(title),
            year: field(year),
            place: field(place),
        }
    }
}
