//! Text canonicalization for catalog lookup and fuzzy comparison.
//!
//! Two flavours exist because the two consumers want different things:
//!
//! - [`normalize_for_index`] produces the token stream stored in (and queried
//!   against) the FTS5 index. It must match exactly what the index builder
//!   wrote, so it only folds characters.
//! - [`normalize_for_fuzzy`] produces labels for similarity scoring. On top of
//!   the folding it breaks common punctuation into spaces and strips a trailing
//!   `s`/`ns` from long words, which absorbs the genitive and dative endings
//!   of early-modern German titles ("Leidens" vs "Leiden").
//!
//! Both functions are total: any input yields a (possibly empty) string.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Function words and bibliographic filler that carry no discriminative
/// signal in index queries.
pub const STOPWORDS: &[&str] = &[
    "der", "die", "das", "und", "oder", "von", "zu", "im", "in", "an", "auf", "herrn", "herr",
    "georgii", "georg", "joh", "jac", "et", "cum", "de", "opus", "tomus", "pars", "liber",
    "tractatus", "dissertatio", "vol", "cap", "tit", "pag", "etc", "bey", "buchhändler",
    "allhier", "haben", "sind", "ist", "eine", "einer", "ein", "neue", "mr", "mr-", "aus", "dem",
    "den", "des", "stuck", "stück", "item", "theil", "band", "bände", "über", "gegen", "nach",
];

/// Scholarly abbreviations expanded before index lookup.
pub const ABBREVIATIONS: &[(&str, &str)] = &[
    ("evangel", "evangelische"),
    ("hist", "historie"),
    ("math", "mathematik"),
    ("theol", "theologie"),
    ("jur", "juristische"),
    ("med", "medizin"),
    ("phil", "philosophie"),
    ("bot", "botschaft"),
];

static INFLECTION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\b([a-z]{5,})(?:ns|s)\b").expect("inflection suffix pattern is valid")
});

/// Returns `true` if `token` (already lowercased) is a stop word.
#[must_use]
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Canonicalize text for index lookup.
///
/// Unicode-decomposes, drops combining marks, lowercases, maps long-s, sharp-s
/// and the `æ`/`œ` ligatures to ASCII, replaces everything outside
/// `[a-z0-9 ]` with a space and collapses whitespace.
///
/// ```
/// use vdmatch_core::normalize::normalize_for_index;
///
/// assert_eq!(normalize_for_index("Frölich, De Peſte"), "frolich de peste");
/// assert_eq!(normalize_for_index("Straße"), "strasse");
/// ```
#[must_use]
pub fn normalize_for_index(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    collapse_to_ascii(&fold(text))
}

/// Canonicalize text for fuzzy similarity labels.
///
/// Same folding as [`normalize_for_index`], but dashes and `.,:;` become
/// spaces first and words of at least five letters lose a trailing `s`/`ns`.
///
/// ```
/// use vdmatch_core::normalize::normalize_for_fuzzy;
///
/// assert_eq!(normalize_for_fuzzy("Christi Leidens"), "christi leiden");
/// assert_eq!(normalize_for_fuzzy("Hist.-Math. Tafeln"), "hist math tafeln");
/// ```
#[must_use]
pub fn normalize_for_fuzzy(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let folded: String = fold(text)
        .chars()
        .map(|c| match c {
            '-' | '–' | '—' | '.' | ',' | ':' | ';' => ' ',
            other => other,
        })
        .collect();
    let stemmed = INFLECTION_SUFFIX.replace_all(&folded, "$1");
    collapse_to_ascii(&stemmed)
}

/// Expand scholarly abbreviations token by token.
///
/// Internal periods are removed before the lookup (`"theol."` → `"theol"`);
/// tokens without a table entry are kept verbatim.
///
/// ```
/// use vdmatch_core::normalize::expand_abbreviations;
///
/// assert_eq!(expand_abbreviations("theol. Bedencken"), "theologie Bedencken");
/// ```
#[must_use]
pub fn expand_abbreviations(text: &str) -> String {
    text.split_whitespace()
        .map(|token| {
            let bare = token.replace('.', "");
            ABBREVIATIONS
                .iter()
                .find(|(short, _)| *short == bare)
                .map_or(token, |(_, long)| *long)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a catalog identifier for comparison: alphanumerics only,
/// lowercased (`"VD18 10225986"` → `"vd1810225986"`).
#[must_use]
pub fn normalize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

static GROUND_TRUTH_ID: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)VD188?\s*:?\s*([0-9A-Z]+)").expect("ground truth pattern is valid")
});

/// Normalize a hand-labelled ground-truth identifier.
///
/// Labels are typed inconsistently (`"VD18 10225986"`, `"VD18:10225986"`,
/// `"vd188 10225986"`). Anything carrying a VD18 marker becomes
/// `vd18<number>`; other labels fall back to [`normalize_identifier`].
///
/// ```
/// use vdmatch_core::normalize::ground_truth_identifier;
///
/// assert_eq!(ground_truth_identifier("VD18: 1022598X"), "vd181022598x");
/// assert_eq!(ground_truth_identifier("VD17 1:234Y"), "vd171234y");
/// ```
#[must_use]
pub fn ground_truth_identifier(label: &str) -> String {
    GROUND_TRUTH_ID
        .captures(label)
        .and_then(|caps| caps.get(1))
        .map_or_else(
            || normalize_identifier(label),
            |number| format!("vd18{}", number.as_str().to_ascii_lowercase()),
        )
}

fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.nfkd().filter(|c| !is_combining_mark(*c)) {
        for lower in c.to_lowercase() {
            match lower {
                'ſ' => out.push('s'),
                'ß' => out.push_str("ss"),
                'æ' => out.push_str("ae"),
                'œ' => out.push_str("oe"),
                other => out.push(other),
            }
        }
    }
    out
}

fn collapse_to_ascii(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(normalize_for_index(""), "");
        assert_eq!(normalize_for_fuzzy(""), "");
        assert_eq!(expand_abbreviations(""), "");
        assert_eq!(normalize_identifier(""), "");
    }

    #[test]
    fn index_folding_handles_historical_letters() {
        assert_eq!(normalize_for_index("Œconomia"), "oeconomia");
        assert_eq!(normalize_for_index("Æthiopia"), "aethiopia");
        assert_eq!(normalize_for_index("Grundriß"), "grundriss");
        assert_eq!(normalize_for_index("Geſchichte"), "geschichte");
        assert_eq!(normalize_for_index("Müller,  Jöcher"), "muller jocher");
    }

    #[test]
    fn index_normalization_keeps_inflection() {
        assert_eq!(normalize_for_index("Christi Leidens"), "christi leidens");
    }

    #[test]
    fn index_normalization_drops_symbols() {
        assert_eq!(normalize_for_index("[Leipzig]: Gleditsch, 1702."), "leipzig gleditsch 1702");
        assert_eq!(normalize_for_index("\t\n  "), "");
    }

    #[test]
    fn fuzzy_strips_suffix_only_on_long_words() {
        assert_eq!(normalize_for_fuzzy("Gottes Wortes"), "gotte worte");
        assert_eq!(normalize_for_fuzzy("des Landes"), "des lande");
        assert_eq!(normalize_for_fuzzy("Leidens"), "leiden");
        assert_eq!(normalize_for_fuzzy("Reiß"), "reiss");
    }

    #[test]
    fn fuzzy_breaks_punctuation() {
        assert_eq!(normalize_for_fuzzy("Leipzig;Halle"), "leipzig halle");
        assert_eq!(normalize_for_fuzzy("Kirchen-Ordnung"), "kirchen ordnung");
    }

    #[test]
    fn abbreviations_expand_with_and_without_periods() {
        assert_eq!(expand_abbreviations("hist. nachricht"), "historie nachricht");
        assert_eq!(expand_abbreviations("jur med"), "juristische medizin");
        assert_eq!(expand_abbreviations("unknown tok."), "unknown tok.");
    }

    #[test]
    fn identifier_normalization() {
        assert_eq!(normalize_identifier("VD18 10225986"), "vd1810225986");
        assert_eq!(normalize_identifier("VD17 1:234567X"), "vd171234567x");
    }

    #[test]
    fn ground_truth_labels_normalize_to_catalog_keys() {
        assert_eq!(ground_truth_identifier("VD18 10225986"), "vd1810225986");
        assert_eq!(ground_truth_identifier("vd18:90000001"), "vd1890000001");
        assert_eq!(ground_truth_identifier("VD188 1234567X"), "vd181234567x");
        assert_eq!(ground_truth_identifier("  "), "");
    }

    #[test]
    fn stopwords_are_lowercase_lookups() {
        assert!(is_stopword("und"));
        assert!(is_stopword("neue"));
        assert!(!is_stopword("Und"));
        assert!(!is_stopword("entrevue"));
    }

    proptest! {
        #[test]
        fn index_normalization_is_idempotent(s in "\\PC{0,40}") {
            let once = normalize_for_index(&s);
            prop_assert_eq!(normalize_for_index(&once), once.clone());
            prop_assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' '));
        }

        #[test]
        fn fuzzy_output_is_restricted_charset(s in "\\PC{0,40}") {
            let out = normalize_for_fuzzy(&s);
            prop_assert!(!out.starts_with(' ') && !out.ends_with(' '));
            prop_assert!(out.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' '));
        }
    }
}
