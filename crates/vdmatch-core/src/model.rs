//! Catalog records, cataloging eras and citation queries.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::normalize::normalize_identifier;

static YEAR_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\b(1[4-9]\d{2})\b").expect("year pattern is valid")
});

/// Extract the first plausible printing year (1400–1999) from free text.
///
/// ```
/// use vdmatch_core::model::extract_year;
///
/// assert_eq!(extract_year("Leipzig, ca. 1702 [i.e. 1703]"), Some(1702));
/// assert_eq!(extract_year("anno 2024"), None);
/// ```
#[must_use]
pub fn extract_year(text: &str) -> Option<u16> {
    YEAR_TOKEN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ---------------------------------------------------------------------------
// Era
// ---------------------------------------------------------------------------

/// Historical cataloging era, encoded as the identifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Era {
    /// 16th-century imprints.
    Vd16,
    /// 17th-century imprints.
    Vd17,
    /// 18th-century imprints.
    Vd18,
}

impl Era {
    /// Lowercase prefix carried by normalized identifiers of this era.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Vd16 => "vd16",
            Self::Vd17 => "vd17",
            Self::Vd18 => "vd18",
        }
    }

    /// Detect the era of a raw or normalized identifier.
    #[must_use]
    pub fn of_identifier(identifier: &str) -> Option<Self> {
        let normalized = normalize_identifier(identifier);
        [Self::Vd16, Self::Vd17, Self::Vd18]
            .into_iter()
            .find(|era| normalized.starts_with(era.prefix()))
    }
}

impl fmt::Display for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for Era {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vd16" => Ok(Self::Vd16),
            "vd17" => Ok(Self::Vd17),
            "vd18" => Ok(Self::Vd18),
            other => Err(format!("unknown era '{other}' (expected vd16, vd17 or vd18)")),
        }
    }
}

// ---------------------------------------------------------------------------
// CatalogRecord
// ---------------------------------------------------------------------------

/// One catalog entry as stored in the FTS5 index.
///
/// Text fields are already normalized for index lookup. Optional fields are
/// `None` when the harvest carried no value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Raw catalog identifier, e.g. `"VD18 10225986"`.
    pub identifier: String,
    pub author: Option<String>,
    pub title: Option<String>,
    /// Four-digit year as stored; may be absent or non-numeric in old dumps.
    pub year: Option<String>,
    pub place: Option<String>,
    pub search_blob: String,
}

impl CatalogRecord {
    /// Numeric year, when the stored value parses.
    #[must_use]
    pub fn year_number(&self) -> Option<u16> {
        self.year.as_deref().and_then(|y| y.trim().parse().ok())
    }

    /// `author title` label used for fuzzy scoring.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{} {}",
            self.author.as_deref().unwrap_or_default(),
            self.title.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }

    #[must_use]
    pub fn normalized_identifier(&self) -> String {
        normalize_identifier(&self.identifier)
    }

    #[must_use]
    pub fn era(&self) -> Option<Era> {
        Era::of_identifier(&self.identifier)
    }

    /// `true` when the catalog recorded no author for this work.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.author.as_deref().is_none_or(|a| a.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// CitationQuery
// ---------------------------------------------------------------------------

/// Structured citation as extracted from a source document.
///
/// Every field is optional. List-valued fields are joined with spaces and
/// numbers are accepted where strings are expected, so
/// `{"author": ["Frölich", "Johann"], "year": 1680}` deserializes cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationQuery {
    #[serde(default, deserialize_with = "joined_text", skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "joined_text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "joined_text", skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "joined_text", skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
}

impl CitationQuery {
    /// Raw text of the citation in author → title → year order.
    ///
    /// Place is deliberately left out; it is scored separately.
    #[must_use]
    pub fn combined_text(&self) -> String {
        [&self.author, &self.title, &self.year]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `true` when no field carries any text.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.combined_text().is_empty()
            && self.place.as_deref().is_none_or(|p| p.trim().is_empty())
    }
}

fn joined_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| flatten_value(&v)))
}

fn flatten_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(flatten_value).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        serde_json::Value::Object(_) => None,
    }
}
