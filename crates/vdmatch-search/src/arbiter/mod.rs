//! Optional arbiter consulted to break ties among the top fused candidates.
//!
//! The arbiter is an injected collaborator ([`Arbiter`]) so tests can swap in
//! a deterministic stub. [`arbitrate`] is the only entry point the pipeline
//! uses, and it never fails: index lookups for the candidate table, transport
//! errors, malformed replies, the "no match" sentinel and picks outside the
//! candidate slice all leave the fused ranking unchanged.
//!
//! A pick is honoured only if its normalized identifier is among the first
//! `max_candidates` fused candidates. The winner then gets score 100, the
//! `ARBITER` origin flag, and moves to the front; the rest keep their order.

pub mod gemini;

use std::fmt::Write as _;

use rusqlite::Connection;
use serde::Serialize;
use tracing::instrument;
use vdmatch_core::db::fts::fetch_records;
use vdmatch_core::model::{CatalogRecord, Era};
use vdmatch_core::normalize::normalize_identifier;

use crate::candidate::Candidate;

pub use gemini::GeminiArbiter;

/// Sentinel a well-behaved arbiter returns when no candidate qualifies.
pub const NO_MATCH_SENTINEL: &str = "NONE";

/// Why an arbiter call produced no verdict.
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("arbiter API key not set (environment variable {0})")]
    MissingApiKey(String),

    #[error("arbiter request failed: {0}")]
    Transport(String),

    #[error("arbiter returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("arbiter reply malformed: {0}")]
    MalformedResponse(String),
}

/// Arbiter decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterVerdict {
    /// Identifier the arbiter picked, as it returned it.
    Match(String),
    NoMatch,
}

impl ArbiterVerdict {
    /// Interpret a raw identifier reply; blank or the sentinel mean no match.
    #[must_use]
    pub fn from_reply(identifier: &str) -> Self {
        let trimmed = identifier.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_MATCH_SENTINEL) {
            Self::NoMatch
        } else {
            Self::Match(trimmed.to_string())
        }
    }
}

/// Everything the arbiter sees for one citation.
#[derive(Debug, Clone, Copy)]
pub struct ArbiterRequest<'a> {
    /// Raw citation text, author → title → year.
    pub query_text: &'a str,
    /// Display fields of the candidates, in fused order.
    pub candidates: &'a [CatalogRecord],
    /// Era to favour when two records are equally plausible.
    pub preferred_era: Era,
    /// Era the preferred one supersedes.
    pub superseded_era: Era,
}

impl ArbiterRequest<'_> {
    /// One `RECORD_ID / AUTHOR / TITLE / YEAR / PLACE` block per candidate.
    #[must_use]
    pub fn candidate_table(&self) -> String {
        let mut table = String::new();
        for record in self.candidates {
            let _ = writeln!(table, "RECORD_ID: {}", record.identifier);
            let _ = writeln!(table, "AUTHOR:    {}", record.author.as_deref().unwrap_or_default());
            let _ = writeln!(table, "TITLE:     {}", record.title.as_deref().unwrap_or_default());
            let _ = writeln!(table, "YEAR:      {}", record.year.as_deref().unwrap_or_default());
            let _ = writeln!(table, "PLACE:     {}", record.place.as_deref().unwrap_or_default());
            table.push_str("-----------------------\n");
        }
        table
    }

    /// Full instruction text: query, candidate table and matching rules.
    #[must_use]
    pub fn prompt(&self) -> String {
        let preferred = self.preferred_era.prefix();
        let superseded = self.superseded_era.prefix();
        format!(
            "You are a bibliographic expert matching a citation to a catalog record.\n\
             \n\
             SEARCH QUERY: \"{query}\"\n\
             \n\
             CANDIDATES:\n\
             {table}\n\
             RULES:\n\
             1. Pick the record that best matches the search query.\n\
             2. When two records are near-equal, prefer a RECORD_ID with the '{preferred}' \
             prefix over '{superseded}'.\n\
             3. Tolerate abbreviations and OCR errors (e.g. 'Bot' = 'Botschaft') as well as \
             partial or paraphrased titles.\n\
             4. A query starting 'Eine neue ...' may match a record starting 'Besondere ...' \
             (or similar) if the core nouns agree.\n\
             5. If the query has no year, match on text alone, still preferring '{preferred}'.\n\
             6. Answer with the RECORD_ID of the best match, or \"{NO_MATCH_SENTINEL}\" if \
             nothing matches.\n",
            query = self.query_text,
            table = self.candidate_table(),
        )
    }
}

/// External oracle for the final tie-break.
pub trait Arbiter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Judge one request.
    ///
    /// # Errors
    ///
    /// Returns an [`ArbiterError`] on transport failures or unusable replies.
    fn judge(&self, request: &ArbiterRequest<'_>) -> Result<ArbiterVerdict, ArbiterError>;
}

/// Result of [`arbitrate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Arbitration {
    /// Final ranking; the pick, if any, is first.
    pub ranked: Vec<Candidate>,
    /// Catalog identifier the arbiter picked, when it was honoured.
    pub pick: Option<String>,
}

impl Arbitration {
    const fn unchanged(ranked: Vec<Candidate>) -> Self {
        Self { ranked, pick: None }
    }
}

/// Let the arbiter review the top of `fused` and promote its pick.
#[instrument(skip(conn, arbiter, fused), fields(arbiter = arbiter.name(), fused = fused.len()))]
pub fn arbitrate(
    conn: &Connection,
    arbiter: &dyn Arbiter,
    query_text: &str,
    fused: Vec<Candidate>,
    max_candidates: usize,
    preferred_era: Era,
    superseded_era: Era,
) -> Arbitration {
    if fused.is_empty() || max_candidates == 0 {
        return Arbitration::unchanged(fused);
    }

    let top = &fused[..fused.len().min(max_candidates)];
    let ids: Vec<&str> = top.iter().map(|c| c.identifier.as_str()).collect();
    let records = match fetch_records(conn, &ids) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "arbiter skipped: candidate lookup failed");
            return Arbitration::unchanged(fused);
        }
    };

    let request = ArbiterRequest {
        query_text,
        candidates: &records,
        preferred_era,
        superseded_era,
    };
    let picked = match arbiter.judge(&request) {
        Ok(ArbiterVerdict::Match(id)) => id,
        Ok(ArbiterVerdict::NoMatch) => {
            tracing::debug!("arbiter found no match");
            return Arbitration::unchanged(fused);
        }
        Err(e) => {
            tracing::warn!(error = %e, "arbiter call failed, keeping fused ranking");
            return Arbitration::unchanged(fused);
        }
    };

    let key = normalize_identifier(&picked);
    let Some(position) = top.iter().position(|c| c.normalized_identifier == key) else {
        tracing::warn!(pick = %picked, "arbiter picked an identifier outside the candidate set");
        return Arbitration::unchanged(fused);
    };

    let ranked = promote(fused, position);
    let pick = ranked.first().map(|c| c.identifier.clone());
    tracing::info!(pick = ?pick, from_rank = position + 1, "arbiter promoted candidate");
    Arbitration { ranked, pick }
}

/// New ranking with `fused[position]` first at score 100; others keep order.
fn promote(fused: Vec<Candidate>, position: usize) -> Vec<Candidate> {
    let mut winner = None;
    let mut rest = Vec::with_capacity(fused.len().saturating_sub(1));
    for (i, candidate) in fused.into_iter().enumerate() {
        if i == position {
            winner = Some(Candidate {
                score: 100.0,
                origin: candidate.origin.with_arbiter(),
                ..candidate
            });
        } else {
            rest.push(candidate);
        }
    }
    winner.into_iter().chain(rest).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::StrategyKind;
    use crate::strategy::fixtures::catalog;

    /// Returns a fixed reply and records how many candidates it was shown.
    struct FixedArbiter {
        reply: Result<ArbiterVerdict, String>,
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl FixedArbiter {
        fn new(reply: Result<ArbiterVerdict, String>) -> Self {
            Self {
                reply,
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl Arbiter for FixedArbiter {
        fn name(&self) -> &str {
            "fixed"
        }

        fn judge(&self, request: &ArbiterRequest<'_>) -> Result<ArbiterVerdict, ArbiterError> {
            let mut seen = self.seen.lock().expect("lock");
            seen.extend(request.candidates.iter().map(|r| r.identifier.clone()));
            self.reply.clone().map_err(ArbiterError::Transport)
        }
    }

    fn fixture() -> (Connection, Vec<Candidate>) {
        let conn = catalog(&[
            ("VD18 1", "frolich", "de peste", "1702", ""),
            ("VD18 2", "", "von der pest", "1703", ""),
            ("VD17 3:3X", "frolich", "pest schrift", "1680", ""),
        ]);
        let fused = vec![
            Candidate::new("VD18 1", 90.0, StrategyKind::Primary),
            Candidate::new("VD18 2", 80.0, StrategyKind::Entity),
            Candidate::new("VD17 3:3X", 70.0, StrategyKind::RareTerm),
        ];
        (conn, fused)
    }

    fn run(arbiter: &FixedArbiter, fused: Vec<Candidate>, conn: &Connection, max: usize) -> Arbitration {
        arbitrate(conn, arbiter, "Frölich Pest 1702", fused, max, Era::Vd18, Era::Vd17)
    }

    #[test]
    fn pick_is_promoted_to_front_with_full_score() {
        let (conn, fused) = fixture();
        let arbiter = FixedArbiter::new(Ok(ArbiterVerdict::Match("vd17 3:3x".into())));
        let out = run(&arbiter, fused, &conn, 25);

        assert_eq!(out.pick.as_deref(), Some("VD17 3:3X"));
        let ids: Vec<_> = out.ranked.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["VD17 3:3X", "VD18 1", "VD18 2"]);
        assert!((out.ranked[0].score - 100.0).abs() < f64::EPSILON);
        assert_eq!(out.ranked[0].origin.to_string(), "RARE_TERM+ARBITER");
    }

    #[test]
    fn pick_outside_top_slice_is_ignored() {
        let (conn, fused) = fixture();
        let before = fused.clone();
        let arbiter = FixedArbiter::new(Ok(ArbiterVerdict::Match("VD17 3:3X".into())));
        let out = run(&arbiter, fused, &conn, 2);
        assert_eq!(out.ranked, before);
        assert!(out.pick.is_none());
        assert_eq!(*arbiter.seen.lock().expect("lock"), vec!["VD18 1", "VD18 2"]);
    }

    #[test]
    fn failures_and_sentinel_leave_ranking_unchanged() {
        for reply in [
            Err("connection reset".to_string()),
            Ok(ArbiterVerdict::NoMatch),
            Ok(ArbiterVerdict::Match("VD18 404".into())),
        ] {
            let (conn, fused) = fixture();
            let before = fused.clone();
            let out = run(&FixedArbiter::new(reply), fused, &conn, 25);
            assert_eq!(out.ranked, before);
            assert!(out.pick.is_none());
        }
    }

    #[test]
    fn empty_list_skips_the_call() {
        let (conn, _) = fixture();
        let arbiter = FixedArbiter::new(Ok(ArbiterVerdict::Match("VD18 1".into())));
        let out = run(&arbiter, Vec::new(), &conn, 25);
        assert!(out.ranked.is_empty());
        assert!(arbiter.seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn verdict_parsing_handles_sentinel() {
        assert_eq!(ArbiterVerdict::from_reply("none"), ArbiterVerdict::NoMatch);
        assert_eq!(ArbiterVerdict::from_reply("  "), ArbiterVerdict::NoMatch);
        assert_eq!(
            ArbiterVerdict::from_reply(" VD18 1 "),
            ArbiterVerdict::Match("VD18 1".into())
        );
    }

    #[test]
    fn prompt_lists_every_candidate_and_rules() {
        let (conn, _) = fixture();
        let records = fetch_records(&conn, &["VD18 1", "VD18 2"]).expect("fetch");
        let request = ArbiterRequest {
            query_text: "Frölich Pest 1702",
            candidates: &records,
            preferred_era: Era::Vd18,
            superseded_era: Era::Vd17,
        };
        let prompt = request.prompt();
        assert!(prompt.contains("SEARCH QUERY: \"Frölich Pest 1702\""));
        assert!(prompt.contains("RECORD_ID: VD18 1\nAUTHOR:    frolich\nTITLE:     de peste"));
        assert!(prompt.contains("RECORD_ID: VD18 2\nAUTHOR:    \n"));
        assert!(prompt.contains("'vd18' prefix over 'vd17'"));
        assert!(prompt.contains("\"NONE\""));
    }
}
