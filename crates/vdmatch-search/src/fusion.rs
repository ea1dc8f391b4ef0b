//! Fusion of per-strategy candidate lists into one ranked result set.
//!
//! # Rules
//!
//! - Candidates are keyed by normalized identifier; the first time a key is
//!   seen fixes its position for tie-breaking.
//! - A duplicate key keeps the highest score. The origin lists every strategy
//!   that reached that score.
//! - With a query year above `era.boundary_year`, candidates of the
//!   superseded era are dropped.
//! - The result is sorted by score descending with a stable sort, so equal
//!   scores keep first-seen order.
//!
//! Scores never decrease during fusion.

use std::collections::HashMap;

use vdmatch_core::config::EraPolicy;
use vdmatch_core::model::Era;

use crate::candidate::{Candidate, sort_by_score};

/// Merge candidate lists (in strategy execution order) into one ranked,
/// deduplicated list.
#[must_use]
pub fn fuse<'a, I>(lists: I, query_year: Option<u16>, era: &EraPolicy) -> Vec<Candidate>
where
    I: IntoIterator<Item = &'a [Candidate]>,
{
    let excluded = excluded_era(query_year, era);

    let mut fused: Vec<Candidate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut dropped = 0usize;

    for candidate in lists.into_iter().flatten() {
        if excluded.is_some() && Era::of_identifier(&candidate.normalized_identifier) == excluded {
            dropped += 1;
            continue;
        }

        match index.get(&candidate.normalized_identifier) {
            Some(&slot) => {
                let kept = &mut fused[slot];
                if candidate.score > kept.score {
                    kept.score = candidate.score;
                    kept.identifier.clone_from(&candidate.identifier);
                    kept.origin = candidate.origin.clone();
                } else if candidate.score.total_cmp(&kept.score).is_eq() {
                    kept.origin.merge(&candidate.origin);
                }
            }
            None => {
                index.insert(candidate.normalized_identifier.clone(), fused.len());
                fused.push(candidate.clone());
            }
        }
    }

    sort_by_score(&mut fused);
    tracing::debug!(fused = fused.len(), era_dropped = dropped, "fusion complete");
    fused
}

fn excluded_era(query_year: Option<u16>, era: &EraPolicy) -> Option<Era> {
    query_year
        .filter(|year| *year > era.boundary_year)
        .map(|_| era.superseded)
}
