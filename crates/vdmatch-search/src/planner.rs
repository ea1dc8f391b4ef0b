//! Query planning: structured citation → index expressions and signals.
//!
//! The planner runs once per citation and everything downstream reads the
//! resulting [`QueryPlan`]. Token selection:
//!
//! 1. normalize the combined citation text for the index and expand
//!    abbreviations,
//! 2. drop pure digits, tokens shorter than `min_token_len` and stop words,
//! 3. deduplicate, then sort by length descending (ties keep first
//!    appearance), so the most discriminative words lead.
//!
//! `strict` is the AND of the first `strict_max_tokens` tokens, `broad` the
//! OR of the first `broad_max_tokens`. When no token survives both are empty
//! and every strategy that needs them returns nothing.

use std::sync::LazyLock;

use regex::Regex;
use vdmatch_core::config::PlannerConfig;
use vdmatch_core::db::fts::{and_expression, or_expression};
use vdmatch_core::model::{CitationQuery, extract_year};
use vdmatch_core::normalize::{
    expand_abbreviations, is_stopword, normalize_for_fuzzy, normalize_for_index,
};

static PROPER_NOUN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\b\p{Lu}\p{Ll}{3,}\b").expect("proper noun pattern is valid")
});

/// Everything the retrieval strategies need to know about one citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    /// Raw combined text, author → title → year.
    pub raw_text: String,
    /// Structured author, trimmed; `None` when absent or blank.
    pub author: Option<String>,
    /// Structured place, trimmed; `None` when absent or blank.
    pub place: Option<String>,
    /// First plausible year in the combined text.
    pub year: Option<u16>,
    /// Fuzzy-normalized combined text (author, title and year).
    pub fuzzy_text: String,
    /// Fuzzy-normalized `author title` label compared against hit labels.
    pub label: String,
    /// Index-normalized text with abbreviations expanded.
    pub index_text: String,
    /// Surviving index tokens, longest first.
    pub tokens: Vec<String>,
    /// AND expression over the longest tokens; empty when no token survives.
    pub strict: String,
    /// OR expression over the longest tokens; empty when no token survives.
    pub broad: String,
}

impl QueryPlan {
    /// `true` when no index expression could be built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.broad.is_empty()
    }

    /// Fuzzy-normalized structured author, if any.
    #[must_use]
    pub fn fuzzy_author(&self) -> Option<String> {
        self.author
            .as_deref()
            .map(normalize_for_fuzzy)
            .filter(|a| !a.is_empty())
    }

    /// Up to `rare_term_max` of the longest index tokens that are at least
    /// `rare_term_min_len` long and not stop words.
    #[must_use]
    pub fn rare_terms(&self, config: &PlannerConfig) -> Vec<String> {
        let mut terms: Vec<&str> = Vec::new();
        for token in self.index_text.split_whitespace() {
            if token.chars().count() >= config.rare_term_min_len
                && !is_stopword(token)
                && !terms.contains(&token)
            {
                terms.push(token);
            }
        }
        terms.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
        terms
            .into_iter()
            .take(config.rare_term_max)
            .map(String::from)
            .collect()
    }

    /// Capitalized words of four or more letters from the raw citation,
    /// stop words excluded, index-normalized and deduplicated.
    #[must_use]
    pub fn entities(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for word in PROPER_NOUN.find_iter(&self.raw_text) {
            if is_stopword(&word.as_str().to_lowercase()) {
                continue;
            }
            let normalized = normalize_for_index(word.as_str());
            if !normalized.is_empty() && !out.contains(&normalized) {
                out.push(normalized);
            }
        }
        out
    }
}

/// Build the plan for one citation.
#[must_use]
pub fn plan_query(query: &CitationQuery, config: &PlannerConfig) -> QueryPlan {
    let raw_text = query.combined_text();
    let author = trimmed(query.author.as_deref());
    let place = trimmed(query.place.as_deref());
    let year = extract_year(&raw_text);

    let label_source = [author.as_deref(), trimmed(query.title.as_deref()).as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    let index_text = expand_abbreviations(&normalize_for_index(&raw_text));
    let tokens = select_tokens(&index_text, config);
    let strict = and_expression(&tokens[..tokens.len().min(config.strict_max_tokens)]);
    let broad = or_expression(&tokens[..tokens.len().min(config.broad_max_tokens)]);

    QueryPlan {
        fuzzy_text: normalize_for_fuzzy(&raw_text),
        label: normalize_for_fuzzy(&label_source),
        raw_text,
        author,
        place,
        year,
        index_text,
        tokens,
        strict,
        broad,
    }
}

fn select_tokens(index_text: &str, config: &PlannerConfig) -> Vec<String> {
    let mut tokens: Vec<&str> = Vec::new();
    for token in index_text.split_whitespace() {
        let keep = token.chars().count() >= config.min_token_len
            && !token.chars().all(|c| c.is_ascii_digit())
            && !is_stopword(token);
        if keep && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    tokens.into_iter().map(String::from).collect()
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(author: Option<&str>, title: Option<&str>, year: Option<&str>) -> CitationQuery {
        CitationQuery {
            author: author.map(String::from),
            title: title.map(String::from),
            year: year.map(String::from),
            place: None,
        }
    }

    #[test]
    fn plan_extracts_signals_and_expressions() {
        let plan = plan_query(
            &query(Some("Frölich"), Some("De Peste"), Some("1680")),
            &PlannerConfig::default(),
        );
        assert_eq!(plan.raw_text, "Frölich De Peste 1680");
        assert_eq!(plan.year, Some(1680));
        assert_eq!(plan.label, "frolich de peste");
        assert_eq!(plan.fuzzy_text, "frolich de peste 1680");
        assert_eq!(plan.tokens, vec!["frolich", "peste"]);
        assert_eq!(plan.strict, "\"frolich\" AND \"peste\"");
        assert_eq!(plan.broad, "\"frolich\" OR \"peste\"");
        assert_eq!(plan.fuzzy_author().as_deref(), Some("frolich"));
    }

    #[test]
    fn tokens_are_deduplicated_and_length_ordered() {
        let plan = plan_query(
            &query(None, Some("Predigt vom Wunder und vom grossen Wunder Gottes"), None),
            &PlannerConfig::default(),
        );
        assert_eq!(plan.tokens, vec!["predigt", "grossen", "wunder", "gottes", "vom"]);
    }

    #[test]
    fn strict_and_broad_respect_token_caps() {
        let config = PlannerConfig::default();
        let plan = plan_query(
            &query(
                None,
                Some("alpha bravo charlie deltas echoes foxtrot golfing hotels indiana juliet"),
                None,
            ),
            &config,
        );
        assert_eq!(plan.strict.matches(" AND ").count(), config.strict_max_tokens - 1);
        assert_eq!(plan.broad.matches(" OR ").count(), config.broad_max_tokens - 1);
    }

    #[test]
    fn stopword_only_query_yields_empty_expressions() {
        let plan = plan_query(
            &query(None, Some("Eine neue von der 1702"), None),
            &PlannerConfig::default(),
        );
        assert!(plan.tokens.is_empty());
        assert!(plan.strict.is_empty());
        assert!(plan.is_empty());
        assert_eq!(plan.year, Some(1702));
    }

    #[test]
    fn abbreviations_expand_in_index_text() {
        let plan = plan_query(&query(None, Some("Theol. Bedencken"), None), &PlannerConfig::default());
        assert_eq!(plan.index_text, "theologie bedencken");
    }

    #[test]
    fn rare_terms_take_longest_distinctive_words() {
        let plan = plan_query(
            &query(None, Some("Eine neue Entrevue zwischen Gelehrten und Studenten"), None),
            &PlannerConfig::default(),
        );
        assert_eq!(
            plan.rare_terms(&PlannerConfig::default()),
            vec!["gelehrten", "studenten", "entrevue"]
        );
    }

    #[test]
    fn entities_are_capitalized_words_without_stopwords() {
        let plan = plan_query(
            &query(Some("Müller"), Some("Eine Predigt über Luther in Halle"), None),
            &PlannerConfig::default(),
        );
        assert_eq!(plan.entities(), vec!["muller", "predigt", "luther", "halle"]);
    }

    #[test]
    fn missing_fields_degrade_to_empty_plan() {
        let plan = plan_query(&CitationQuery::default(), &PlannerConfig::default());
        assert!(plan.raw_text.is_empty());
        assert!(plan.author.is_none());
        assert!(plan.year.is_none());
        assert!(plan.is_empty());
        assert!(plan.entities().is_empty());
    }
}
