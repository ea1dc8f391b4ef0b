//! Entity fallback: reward hits that mention the citation's proper nouns.

use anyhow::Result;
use rusqlite::Connection;
use vdmatch_core::config::MatchConfig;
use vdmatch_core::db::fts::{CatalogSearch, RankOrder, search_catalog};

use super::hit_label;
use crate::candidate::{Candidate, StrategyKind, sort_by_score};
use crate::planner::QueryPlan;
use crate::similarity::token_set_ratio;

/// # Errors
///
/// Returns an error if the index lookup fails.
pub fn retrieve(conn: &Connection, plan: &QueryPlan, config: &MatchConfig) -> Result<Vec<Candidate>> {
    if plan.broad.is_empty() {
        return Ok(Vec::new());
    }

    let hits = search_catalog(
        conn,
        &CatalogSearch {
            expression: &plan.broad,
            order: RankOrder::Relevance,
            years: None,
            limit: config.limits.entity_rows,
        },
    )?;

    let entities = plan.entities();
    let weights = &config.weights;
    let mut out: Vec<Candidate> = hits
        .iter()
        .filter(|record| !record.identifier.is_empty())
        .filter_map(|record| {
            // Stored fields are index-normalized, like the entities.
            let stored_label = record.label();
            let mentions = entities.iter().filter(|e| stored_label.contains(e.as_str())).count();

            #[allow(clippy::cast_precision_loss)]
            let mut score = token_set_ratio(&plan.label, &hit_label(record))
                + weights.entity_bonus * mentions as f64;
            if record.era() == Some(config.era.recent) {
                score += weights.recent_era_bonus;
            }

            (score >= weights.min_accept_score)
                .then(|| Candidate::new(&record.identifier, score, StrategyKind::Entity))
        })
        .collect();

    sort_by_score(&mut out);
    Ok(out)
}
