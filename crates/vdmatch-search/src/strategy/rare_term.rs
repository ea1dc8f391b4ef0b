//! Rare-term fallback.
//!
//! Searches for the few longest distinctive words of the citation alone
//! (`"eine neue entrevue"` → `"entrevue"`), for titles where one unusual word
//! carries the identification and the full phrase would not. Without any
//! structural corroboration the acceptance bar is higher than elsewhere.

use anyhow::Result;
use rusqlite::Connection;
use vdmatch_core::config::MatchConfig;
use vdmatch_core::db::fts::{CatalogSearch, RankOrder, or_expression, search_catalog};

use super::hit_label;
use crate::candidate::{Candidate, StrategyKind, sort_by_score};
use crate::planner::QueryPlan;
use crate::similarity::token_set_ratio;

/// # Errors
///
/// Returns an error if the index lookup fails.
pub fn retrieve(conn: &Connection, plan: &QueryPlan, config: &MatchConfig) -> Result<Vec<Candidate>> {
    let terms = plan.rare_terms(&config.planner);
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let expression = or_expression(&terms);
    let hits = search_catalog(
        conn,
        &CatalogSearch {
            expression: &expression,
            order: RankOrder::Relevance,
            years: None,
            limit: config.limits.rare_term_rows,
        },
    )?;

    let threshold = config.weights.rare_term_accept_score;
    let mut out: Vec<Candidate> = hits
        .iter()
        .filter(|record| !record.identifier.is_empty())
        .filter_map(|record| {
            let score = token_set_ratio(&plan.label, &hit_label(record));
            (score >= threshold).then(|| Candidate::new(&record.identifier, score, StrategyKind::RareTerm))
        })
        .collect();

    sort_by_score(&mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan_query;
    use crate::strategy::fixtures::{catalog, query};

    #[test]
    fn finds_record_by_single_distinctive_word() {
        let conn = catalog(&[
            ("VD18 90000001", "", "Eine kurtze Entrevue zwischen zweyen Gelehrten", "1704", ""),
            ("VD18 90000002", "", "Kirchen-Ordnung", "1704", ""),
        ]);
        let config = MatchConfig::default();
        let plan = plan_query(&query("", "Eine neue Entrevue", "", ""), &config.planner);
        let out = retrieve(&conn, &plan, &config).expect("rare term retrieval");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].identifier, "VD18 90000001");
        assert!(out[0].score >= 65.0);
    }

    #[test]
    fn shared_words_count_toward_full_set_similarity() {
        // token set 78 against the 65 bar: "aus"/"au" and "ungarn"/"hungarn"
        // differ, but the shared "relation" keeps both sides close.
        let conn = catalog(&[("VD18 1", "", "Relation au Hungarn Zeitung", "", "")]);
        let config = MatchConfig::default();
        let plan = plan_query(&query("", "Relation aus Ungarn", "", ""), &config.planner);
        let out = retrieve(&conn, &plan, &config).expect("rare term retrieval");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].identifier, "VD18 1");
        assert!((out[0].score - 1800.0 / 23.0).abs() < 0.01);
    }

    #[test]
    fn weak_overlap_is_rejected() {
        let conn = catalog(&[(
            "VD18 90000003",
            "",
            "Entrevue der Todten im Reiche der Schatten mit vielen Anmerckungen",
            "",
            "",
        )]);
        let config = MatchConfig::default();
        let plan = plan_query(&query("", "Eine neue Entrevue zu Hamburg", "", ""), &config.planner);
        let out = retrieve(&conn, &plan, &config).expect("rare term retrieval");
        assert!(out.is_empty());
    }

    #[test]
    fn short_words_only_yield_nothing() {
        let conn = catalog(&[("VD18 1", "", "Vom Tod", "", "")]);
        let config = MatchConfig::default();
        let plan = plan_query(&query("", "Vom Tod", "", ""), &config.planner);
        assert!(retrieve(&conn, &plan, &config).expect("retrieval").is_empty());
    }
}
