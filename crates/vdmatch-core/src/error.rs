use std::fmt;
use std::path::PathBuf;

/// Machine-readable error codes for scripted pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    IndexNotFound,
    IndexSchemaInvalid,
    ConfigParseError,
    EmptyQuery,
    TestSetUnreadable,
    HarvestUnreadable,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::IndexNotFound => "E1001",
            Self::IndexSchemaInvalid => "E1002",
            Self::ConfigParseError => "E2001",
            Self::EmptyQuery => "E3001",
            Self::TestSetUnreadable => "E3002",
            Self::HarvestUnreadable => "E4001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::IndexNotFound => "Catalog index not found",
            Self::IndexSchemaInvalid => "Catalog index is empty or has no catalog table",
            Self::ConfigParseError => "Config file parse error",
            Self::EmptyQuery => "Citation query has no text",
            Self::TestSetUnreadable => "Evaluation test set unreadable",
            Self::HarvestUnreadable => "Catalog harvest file unreadable",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::IndexNotFound | Self::IndexSchemaInvalid => {
                Some("Run `vdm index build --source <harvest.jsonl>` to create the index.")
            }
            Self::ConfigParseError => Some("Fix syntax in the vdmatch config.toml and retry."),
            Self::EmptyQuery => Some("Provide at least one of --author, --title or --year."),
            Self::TestSetUnreadable => {
                Some("Expected a JSON array of {\"query\": {...}, \"expected\": \"VD18 ...\"}.")
            }
            Self::HarvestUnreadable => Some("Check the path and that the file is JSON lines."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures opening the catalog index. Fatal at start-up.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog index {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("catalog index {} has no catalog table", .0.display())]
    NoCatalogTable(PathBuf),

    #[error("catalog index {} contains no records", .0.display())]
    Empty(PathBuf),
}

impl CatalogError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Missing(_) => ErrorCode::IndexNotFound,
            Self::NoCatalogTable(_) | Self::Empty(_) => ErrorCode::IndexSchemaInvalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CatalogError, ErrorCode};
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::IndexNotFound,
            ErrorCode::IndexSchemaInvalid,
            ErrorCode::ConfigParseError,
            ErrorCode::EmptyQuery,
            ErrorCode::TestSetUnreadable,
            ErrorCode::HarvestUnreadable,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::ConfigParseError.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn catalog_errors_map_to_codes() {
        let missing = CatalogError::Missing(PathBuf::from("/nope.db"));
        assert_eq!(missing.error_code(), ErrorCode::IndexNotFound);
        assert!(missing.to_string().contains("/nope.db"));
        assert_eq!(
            CatalogError::Empty(PathBuf::from("x.db")).error_code(),
            ErrorCode::IndexSchemaInvalid
        );
    }
}
