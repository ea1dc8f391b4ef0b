//! Per-citation pipeline: plan → strategies → fusion → arbiter.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::instrument;
use vdmatch_core::config::MatchConfig;
use vdmatch_core::model::CitationQuery;

use crate::arbiter::{Arbiter, arbitrate};
use crate::candidate::{Candidate, StrategyKind};
use crate::fusion::fuse;
use crate::planner::plan_query;
use crate::strategy::{StrategyRun, run_all};

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchOutcome {
    /// Final ranking, best first.
    pub candidates: Vec<Candidate>,
    /// Accepted candidates of each strategy, in execution order.
    pub strategy_runs: Vec<StrategyRun>,
    /// Identifier the arbiter promoted, if it was consulted and agreed.
    pub arbiter_pick: Option<String>,
}

impl MatchOutcome {
    #[must_use]
    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Best candidate a single strategy produced before fusion.
    #[must_use]
    pub fn top_of(&self, kind: StrategyKind) -> Option<&Candidate> {
        self.strategy_runs
            .iter()
            .find(|run| run.strategy == kind)
            .and_then(|run| run.candidates.first())
    }

    /// Whether `normalized_identifier` is among the first `k` final candidates.
    #[must_use]
    pub fn hit_at(&self, normalized_identifier: &str, k: usize) -> bool {
        self.candidates
            .iter()
            .take(k)
            .any(|c| c.normalized_identifier == normalized_identifier)
    }
}

/// Match one citation against the catalog.
///
/// The arbiter is consulted only when one is supplied; callers decide that
/// from `config.arbiter.enabled` and credential availability. Arbiter
/// failures never surface here.
///
/// # Errors
///
/// Returns an error if an index lookup fails.
#[instrument(skip(conn, config, arbiter), fields(arbiter = arbiter.is_some()))]
pub fn match_citation(
    conn: &Connection,
    query: &CitationQuery,
    config: &MatchConfig,
    arbiter: Option<&dyn Arbiter>,
) -> Result<MatchOutcome> {
    if query.is_blank() {
        tracing::debug!("blank citation, nothing to match");
        return Ok(MatchOutcome::default());
    }

    let plan = plan_query(query, &config.planner);
    let strategy_runs = run_all(conn, &plan, config)?;
    let fused = fuse(
        strategy_runs.iter().map(|run| run.candidates.as_slice()),
        plan.year,
        &config.era,
    );

    let (candidates, arbiter_pick) = match arbiter {
        Some(arbiter) if !fused.is_empty() => {
            let arbitration = arbitrate(
                conn,
                arbiter,
                &plan.raw_text,
                fused,
                config.arbiter.max_candidates,
                config.era.recent,
                config.era.superseded,
            );
            (arbitration.ranked, arbitration.pick)
        }
        _ => (fused, None),
    };

    tracing::info!(
        year = ?plan.year,
        tokens = plan.tokens.len(),
        candidates = candidates.len(),
        top = candidates.first().map_or("-", |c| c.identifier.as_str()),
        arbiter_pick = arbiter_pick.as_deref().unwrap_or("-"),
        "citation matched"
    );

    Ok(MatchOutcome {
        candidates,
        strategy_runs,
        arbiter_pick,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::fixtures::{catalog, query};

    #[test]
    fn blank_query_yields_empty_outcome() {
        let conn = catalog(&[("VD18 1", "frolich", "de peste", "1702", "")]);
        let out = match_citation(&conn, &query("", " ", "", ""), &MatchConfig::default(), None)
            .expect("pipeline");
        assert!(out.candidates.is_empty());
        assert!(out.strategy_runs.is_empty());
    }

    #[test]
    fn outcome_reports_every_strategy() {
        let conn = catalog(&[("VD18 1", "frolich", "de peste", "1702", "")]);
        let out = match_citation(
            &conn,
            &query("Frölich", "De Peste", "1702", ""),
            &MatchConfig::default(),
            None,
        )
        .expect("pipeline");
        let kinds: Vec<_> = out.strategy_runs.iter().map(|r| r.strategy).collect();
        assert_eq!(kinds, StrategyKind::ALL.to_vec());
        assert_eq!(out.top().map(|c| c.identifier.as_str()), Some("VD18 1"));
        assert!(out.hit_at("vd181", 5));
        assert!(out.top_of(StrategyKind::Primary).is_some());
        assert!(out.arbiter_pick.is_none());
    }
}
