//! Fuzzy string similarity on a 0–100 scale.
//!
//! All scorers work on `char`s, never bytes, and return `f64` in `[0, 100]`.
//! Inputs are expected to be normalized already (see
//! [`vdmatch_core::normalize::normalize_for_fuzzy`]); no case folding or
//! punctuation handling happens here.
//!
//! | Scorer               | Measures                                                    |
//! |----------------------|-------------------------------------------------------------|
//! | [`ratio`]            | normalized indel similarity, `2·LCS / (|a| + |b|)`           |
//! | [`partial_ratio`]    | best [`ratio`] of the shorter string against any window of the longer |
//! | [`token_sort_ratio`] | [`ratio`] after sorting tokens                              |
//! | [`token_set_ratio`]  | order- and duplicate-insensitive token overlap              |
//! | [`weighted_ratio`]   | blend of the above, weighted by the length ratio            |

use std::collections::BTreeSet;

use rapidfuzz::distance::indel;

const MAX_SCORE: f64 = 100.0;

/// Indel similarity of two strings.
///
/// Two empty strings are identical (100).
#[must_use]
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return MAX_SCORE;
    }
    scaled(indel::normalized_similarity(a.chars(), b.chars()))
}

/// Best [`ratio`] of the shorter string against every same-length window of
/// the longer one, including windows clipped at either end.
///
/// Returns 0 when either side is empty.
#[must_use]
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    if a.len() == b.len() {
        return best_window(&a, &b).max(best_window(&b, &a));
    }
    if a.len() < b.len() {
        best_window(&a, &b)
    } else {
        best_window(&b, &a)
    }
}

/// [`ratio`] of both strings after sorting their tokens.
#[must_use]
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Order- and duplicate-insensitive token overlap.
///
/// Compares the shared tokens against each side's full token set, and the
/// two full sets against each other, and keeps the best score. Returns 100
/// when one token set contains the other, and 0 when either side has no
/// tokens.
#[must_use]
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let sect = join(tokens_a.intersection(&tokens_b));
    let diff_ab = join(tokens_a.difference(&tokens_b));
    let diff_ba = join(tokens_b.difference(&tokens_a));

    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return MAX_SCORE;
    }

    if sect.is_empty() {
        return ratio(&diff_ab, &diff_ba);
    }

    let sect_ab = format!("{sect} {diff_ab}");
    let sect_ba = format!("{sect} {diff_ba}");
    ratio(&sect, &sect_ab)
        .max(ratio(&sect, &sect_ba))
        .max(ratio(&sect_ab, &sect_ba))
}

/// Weighted blend of the scorers above.
///
/// Strings of similar length are compared whole (plain and token-based);
/// when one is much longer, partial alignment dominates and is scaled down
/// the more the lengths differ. Returns 0 when either side is empty.
#[must_use]
pub fn weighted_ratio(a: &str, b: &str) -> f64 {
    const UNBASE_SCALE: f64 = 0.95;

    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a == 0 || len_b == 0 {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let len_ratio = len_a.max(len_b) as f64 / len_a.min(len_b) as f64;
    let whole = ratio(a, b);

    if len_ratio < 1.5 {
        let tokens = token_set_ratio(a, b).max(token_sort_ratio(a, b));
        return whole.max(tokens * UNBASE_SCALE);
    }

    let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
    let partial = partial_ratio(a, b) * partial_scale;
    let partial_tokens = partial_token_ratio(a, b) * UNBASE_SCALE * partial_scale;
    whole.max(partial).max(partial_tokens)
}

fn partial_token_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    if tokens_a.intersection(&tokens_b).next().is_some() {
        return MAX_SCORE;
    }

    let diff_ab = join(tokens_a.difference(&tokens_b));
    let diff_ba = join(tokens_b.difference(&tokens_a));
    partial_ratio(&diff_ab, &diff_ba).max(partial_ratio(&sorted_tokens(a), &sorted_tokens(b)))
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return MAX_SCORE;
    }
    scaled(indel::normalized_similarity(a.iter().copied(), b.iter().copied()))
}

fn scaled(similarity: f64) -> f64 {
    (similarity * MAX_SCORE).clamp(0.0, MAX_SCORE)
}

/// Best ratio of `short` against windows of `long` (`short.len() <= long.len()`).
fn best_window(short: &[char], long: &[char]) -> f64 {
    let n = short.len();
    let m = long.len();
    let mut best: f64 = 0.0;

    let windows = (1..n)
        .map(|end| &long[..end])
        .chain((0..=m - n).map(|start| &long[start..start + n]))
        .chain((m - n + 1..m).map(|start| &long[start..]));

    for window in windows {
        best = best.max(ratio_chars(short, window));
        if best >= MAX_SCORE {
            break;
        }
    }
    best
}

fn sorted_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join<'a>(tokens: impl Iterator<Item = &'a &'a str>) -> String {
    tokens.copied().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
