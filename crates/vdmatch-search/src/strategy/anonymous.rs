//! Anonymous-work fallback.
//!
//! Citations often name a person the work is about or dedicated to in the
//! author slot, while the catalog records the work without an author. This
//! strategy looks only at author-less catalog rows near the query year whose
//! title contains the query "author", and scores the whole citation against
//! the title.
//!
//! Runs only when the plan has a broad expression, a year and an author of at
//! least `anonymous_min_author_len` characters.

use anyhow::Result;
use rusqlite::Connection;
use vdmatch_core::config::MatchConfig;
use vdmatch_core::db::fts::{CatalogSearch, RankOrder, search_catalog};
use vdmatch_core::normalize::normalize_for_fuzzy;

use crate::candidate::{Candidate, StrategyKind, sort_by_score};
use crate::planner::QueryPlan;
use crate::similarity::{partial_ratio, weighted_ratio};

/// # Errors
///
/// Returns an error if the index lookup fails.
pub fn retrieve(conn: &Connection, plan: &QueryPlan, config: &MatchConfig) -> Result<Vec<Candidate>> {
    let Some(year) = plan.year else {
        return Ok(Vec::new());
    };
    let Some(author) = plan
        .fuzzy_author()
        .filter(|a| a.chars().count() >= config.planner.anonymous_min_author_len)
    else {
        return Ok(Vec::new());
    };
    if plan.broad.is_empty() {
        return Ok(Vec::new());
    }

    let window = config.limits.anonymous_year_window;
    let hits = search_catalog(
        conn,
        &CatalogSearch {
            expression: &plan.broad,
            order: RankOrder::Relevance,
            years: Some(year.saturating_sub(window)..=year.saturating_add(window)),
            limit: config.limits.anonymous_rows,
        },
    )?;

    let weights = &config.weights;
    let mut out: Vec<Candidate> = hits
        .iter()
        .filter(|record| record.is_anonymous() && !record.identifier.is_empty())
        .filter_map(|record| {
            let title = normalize_for_fuzzy(record.title.as_deref().unwrap_or_default());
            if partial_ratio(&author, &title) <= weights.anonymous_min_title_similarity {
                return None;
            }
            let delta = record.year_number().map_or(0, |y| year.abs_diff(y));
            let score = weighted_ratio(&plan.fuzzy_text, &title) + weights.anonymous_bonus
                - f64::from(delta);
            (score >= weights.min_accept_score)
                .then(|| Candidate::new(&record.identifier, score, StrategyKind::Anonymous))
        })
        .collect();

    sort_by_score(&mut out);
    Ok(out)
}
