//! Scored catalog candidates and their provenance.

use std::fmt;

use serde::{Serialize, Serializer};
use vdmatch_core::normalize::normalize_identifier;

/// Retrieval strategy that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyKind {
    /// Strict AND lookup with year preference, broad OR re-run.
    Primary,
    /// Unattributed works whose title names the query author.
    Anonymous,
    /// Proper-noun overlap with the raw citation.
    Entity,
    /// Longest distinctive words only.
    RareTerm,
}

impl StrategyKind {
    pub const ALL: [Self; 4] = [Self::Primary, Self::Anonymous, Self::Entity, Self::RareTerm];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY",
            Self::Anonymous => "ANONYMOUS",
            Self::Entity => "ENTITY",
            Self::RareTerm => "RARE_TERM",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StrategyKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Provenance tag: the strategies that produced the kept score, plus whether
/// the arbiter promoted the candidate.
///
/// Renders as `PRIMARY`, `PRIMARY+ENTITY` or `RARE_TERM+ARBITER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    strategies: Vec<StrategyKind>,
    arbiter: bool,
}

impl Origin {
    #[must_use]
    pub fn new(strategy: StrategyKind) -> Self {
        Self {
            strategies: vec![strategy],
            arbiter: false,
        }
    }

    #[must_use]
    pub fn strategies(&self) -> &[StrategyKind] {
        &self.strategies
    }

    #[must_use]
    pub const fn is_arbiter_pick(&self) -> bool {
        self.arbiter
    }

    /// Record another strategy that reached the same score.
    pub fn merge(&mut self, other: &Self) {
        for strategy in &other.strategies {
            if !self.strategies.contains(strategy) {
                self.strategies.push(*strategy);
            }
        }
        self.arbiter |= other.arbiter;
    }

    #[must_use]
    pub fn with_arbiter(mut self) -> Self {
        self.arbiter = true;
        self
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<&str> = self.strategies.iter().map(|s| s.as_str()).collect();
        if self.arbiter {
            parts.push("ARBITER");
        }
        f.write_str(&parts.join("+"))
    }
}

impl Serialize for Origin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One scored catalog hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Identifier exactly as stored in the catalog.
    pub identifier: String,
    /// Alphanumeric-only, lowercased identifier used for deduplication.
    pub normalized_identifier: String,
    /// Score in `[0, 100]`.
    pub score: f64,
    pub origin: Origin,
}

impl Candidate {
    /// Build a candidate, clamping `score` into `[0, 100]`.
    #[must_use]
    pub fn new(identifier: &str, score: f64, strategy: StrategyKind) -> Self {
        Self {
            identifier: identifier.to_string(),
            normalized_identifier: normalize_identifier(identifier),
            score: clamp_score(score),
            origin: Origin::new(strategy),
        }
    }
}

/// Clamp a raw heuristic score into `[0, 100]`; NaN becomes 0.
#[must_use]
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Sort descending by score; ties keep their current order.
pub fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}
